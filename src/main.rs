mod answer_client;
mod cli;
mod config;
mod error;

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use eyre::{bail, Result};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::answer_client::AnswerClient;
use crate::cli::chat::controller::ConversationController;
use crate::cli::chat::{ChatContext, SessionMode};
use crate::config::{default_config_path, ClientConfig, Overrides};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(flatten)]
    session: SessionArgs,
}

/// Options that apply to every subcommand, before or after its name.
#[derive(Args, Clone, Default)]
struct ConnectionArgs {
    /// Address of the answer service
    #[arg(long, value_name = "URL", global = true)]
    url: Option<String>,

    /// Seconds to wait for an answer before giving up
    #[arg(long, value_name = "SECS", global = true)]
    timeout: Option<u64>,

    /// Path to a JSON config file
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

impl ConnectionArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            service_url: self.url.clone(),
            timeout_secs: self.timeout,
        }
    }
}

#[derive(Args, Clone, Default)]
struct SessionArgs {
    /// Ask a single question, print the answer and exit
    #[arg(short, long)]
    input: Option<String>,

    /// Use a simple line editor instead of the raw terminal
    #[arg(long)]
    plain: bool,
}

impl SessionArgs {
    fn is_set(&self) -> bool {
        self.input.is_some() || self.plain
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start a chat session
    Chat(SessionArgs),
    /// Print the resolved configuration
    Config,
}

enum Action {
    Chat(SessionArgs),
    ShowConfig,
}

impl Cli {
    /// Merge session flags given before and after `chat`; the later ones win.
    fn into_action(self) -> Result<(ConnectionArgs, Action)> {
        let action = match self.command {
            None => Action::Chat(self.session),
            Some(Commands::Chat(args)) => Action::Chat(SessionArgs {
                input: args.input.or(self.session.input),
                plain: args.plain || self.session.plain,
            }),
            Some(Commands::Config) => {
                if self.session.is_set() {
                    bail!("--input and --plain cannot be used with the config subcommand");
                }
                Action::ShowConfig
            }
        };
        Ok((self.connection, action))
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();

    let (connection, action) = cli.into_action()?;

    let log_level = if connection.verbose { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = ClientConfig::load(connection.config.as_deref(), &connection.overrides())?;

    let session = match action {
        Action::Chat(session) => session,
        Action::ShowConfig => {
            let path = connection.config.clone().or_else(default_config_path);
            println!(
                "config file:  {}",
                path.map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(none)".to_string())
            );
            println!("service url:  {}", config.service_url);
            println!("timeout:      {}s", config.request_timeout.as_secs());
            return Ok(ExitCode::SUCCESS);
        }
    };

    info!("Starting StudyBuddy chat against {}", config.service_url);

    let client = AnswerClient::new(&config)?;
    info!("Answer service endpoint: {}", client.endpoint());
    let controller = ConversationController::new(Arc::new(client), config.request_timeout);

    let mode = match session.input {
        Some(input) => SessionMode::OneShot(input),
        None if session.plain || !io::stdin().is_terminal() => SessionMode::Plain,
        None => SessionMode::Interactive,
    };

    let mut chat_context = ChatContext::new(Box::new(io::stdout()), mode, controller);
    chat_context.run().await
}
