pub mod command;
pub mod controller;
pub mod conversation_state;
pub mod keymap;
pub mod prompt;
pub mod render;

use std::io::{self, Write};
use std::process::ExitCode;

use command::Command;
use controller::{ConversationController, KeyOutcome, Settlement, Submit, SubmitOutcome};
use conversation_state::Turn;
use crossterm::event::{
    Event, EventStream, KeyEvent, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::{execute, terminal};
use eyre::Result;
use futures::future::BoxFuture;
use futures::StreamExt;
use keymap::KeyAction;
use prompt::generate_prompt;
use render::{RenderMode, TerminalRenderer};
use rustyline::error::ReadlineError;
use tracing::{debug, info, warn};

const WELCOME_TEXT: &str = "
Hi, I'm StudyBuddy. Ask me anything about your notes.

Enter         Send your question
Shift+Enter   Start a new line (Ctrl+J also works)
/help         Show the help dialogue
/quit         Quit the application
";

const HELP_TEXT: &str = "
StudyBuddy

/clear        Start a new conversation
/help         Show this help dialogue
/quit         Quit the application

Only one question is answered at a time. You can keep typing while
an answer is on its way, but Enter waits until it has arrived.
";

/// How a session takes its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMode {
    /// Ask a single question, print the answer and exit.
    OneShot(String),
    /// Raw terminal with live key handling.
    Interactive,
    /// Line editor, one question per line.
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct ChatContext {
    output: Box<dyn Write>,
    mode: SessionMode,
    controller: ConversationController,
    raw: bool,
}

impl ChatContext {
    pub fn new(
        output: Box<dyn Write>,
        mode: SessionMode,
        controller: ConversationController,
    ) -> Self {
        Self {
            output,
            mode,
            controller,
            raw: false,
        }
    }

    pub async fn run(&mut self) -> Result<ExitCode> {
        match self.mode.clone() {
            SessionMode::OneShot(input) => self.run_once(&input).await,
            SessionMode::Interactive => {
                self.print_welcome()?;
                self.controller.subscribe(Box::new(TerminalRenderer::new(
                    Box::new(io::stdout()),
                    RenderMode::Raw,
                )));
                self.run_interactive().await?;
                Ok(ExitCode::SUCCESS)
            }
            SessionMode::Plain => {
                self.print_welcome()?;
                self.controller.subscribe(Box::new(TerminalRenderer::new(
                    Box::new(io::stdout()),
                    RenderMode::Plain,
                )));
                self.run_plain().await?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }

    fn print_welcome(&mut self) -> Result<()> {
        writeln!(self.output, "{}", WELCOME_TEXT)?;
        Ok(())
    }

    /// Write a block of text, translating line endings while in raw mode.
    fn print_block(&mut self, text: &str) -> Result<()> {
        if self.raw {
            write!(self.output, "\r\n{}\r\n", text.replace('\n', "\r\n"))?;
        } else {
            writeln!(self.output, "{}", text)?;
        }
        self.output.flush()?;
        Ok(())
    }

    async fn run_once(&mut self, input: &str) -> Result<ExitCode> {
        let outcome = self.controller.submit(input).await;
        let last = self
            .controller
            .transcript()
            .last()
            .map(Turn::content)
            .unwrap_or_default()
            .to_string();

        match outcome {
            SubmitOutcome::Answered => {
                writeln!(self.output, "{}", last)?;
                Ok(ExitCode::SUCCESS)
            }
            SubmitOutcome::Failed(_) => {
                writeln!(self.output, "{}", last)?;
                Ok(ExitCode::FAILURE)
            }
            SubmitOutcome::Empty | SubmitOutcome::Busy => {
                writeln!(self.output, "Nothing to ask: the input is empty.")?;
                Ok(ExitCode::FAILURE)
            }
        }
    }

    async fn run_interactive(&mut self) -> Result<()> {
        let _raw_mode = RawModeGuard::enable()?;
        self.raw = true;

        let mut events = EventStream::new();
        let mut in_flight: Option<BoxFuture<'static, Settlement>> = None;
        self.controller.refresh();

        let result = loop {
            tokio::select! {
                event = events.next() => {
                    let event = match event {
                        Some(Ok(event)) => event,
                        Some(Err(e)) => break Err(e.into()),
                        None => break Ok(()),
                    };
                    match event {
                        Event::Key(key) => match self.handle_key(key, &mut in_flight) {
                            Ok(Flow::Continue) => {}
                            Ok(Flow::Quit) => break Ok(()),
                            Err(e) => break Err(e),
                        },
                        Event::Resize(..) => self.controller.refresh(),
                        _ => {}
                    }
                }
                settlement = wait_for(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    self.controller.settle(settlement);
                }
            }
        };

        if self.controller.is_pending() {
            info!("Leaving with a request still in flight");
        }
        self.raw = false;
        write!(self.output, "\r\n")?;
        result
    }

    fn handle_key(
        &mut self,
        key: KeyEvent,
        in_flight: &mut Option<BoxFuture<'static, Settlement>>,
    ) -> Result<Flow> {
        let action = keymap::interpret(&key);

        if action == KeyAction::Commit {
            if let Some(command) = Command::parse(self.controller.draft()) {
                self.controller.clear_draft();
                return self.run_command(command);
            }
        }

        match self.controller.apply(action) {
            KeyOutcome::Submitted(Submit::Accepted(request)) => {
                debug!("Dispatching question: {:?}", request.question());
                *in_flight = Some(Box::pin(request.send()));
            }
            KeyOutcome::Submitted(Submit::Busy) => {
                debug!("Enter pressed while waiting for an answer");
            }
            KeyOutcome::Submitted(Submit::Empty) => {}
            KeyOutcome::Interrupt => return Ok(Flow::Quit),
            KeyOutcome::Edited | KeyOutcome::Ignored => {}
        }
        Ok(Flow::Continue)
    }

    async fn run_plain(&mut self) -> Result<()> {
        let mut rl = prompt::rl()?;

        loop {
            let readline = rl.readline(generate_prompt(false));

            match readline {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    rl.add_history_entry(line.as_str());

                    if let Some(command) = Command::parse(&line) {
                        if self.run_command(command)? == Flow::Quit {
                            break;
                        }
                        continue;
                    }

                    self.controller.submit(&line).await;
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
                Err(e) => {
                    writeln!(self.output, "Error: {}", e)?;
                    break;
                }
            }
        }

        Ok(())
    }

    fn run_command(&mut self, command: Command) -> Result<Flow> {
        debug!("Running command {:?}", command);
        match command {
            Command::Help => {
                self.print_block(HELP_TEXT)?;
                self.controller.refresh();
            }
            Command::Clear => {
                if !self.controller.reset() {
                    self.print_block("Cannot clear while waiting for an answer.")?;
                    self.controller.refresh();
                }
            }
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }
}

async fn wait_for(in_flight: &mut Option<BoxFuture<'static, Settlement>>) -> Settlement {
    match in_flight {
        Some(request) => request.await,
        None => std::future::pending().await,
    }
}

/// Keeps the terminal in raw mode for as long as it lives.
struct RawModeGuard {
    enhanced_keys: bool,
}

impl RawModeGuard {
    fn enable() -> Result<Self> {
        terminal::enable_raw_mode()?;

        // Lets the terminal report Shift+Enter separately from Enter.
        let enhanced_keys = terminal::supports_keyboard_enhancement().unwrap_or(false);
        if enhanced_keys {
            execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
            )?;
        }
        debug!("Raw mode enabled (keyboard enhancement: {})", enhanced_keys);

        Ok(Self { enhanced_keys })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enhanced_keys {
            if let Err(e) = execute!(io::stdout(), PopKeyboardEnhancementFlags) {
                warn!("Failed to restore keyboard flags: {}", e);
            }
        }
        if let Err(e) = terminal::disable_raw_mode() {
            warn!("Failed to leave raw mode: {}", e);
        }
    }
}
