use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The single failure kind that reaches the transcript.
///
/// Whatever goes wrong between dispatching a question and reading its
/// answer ends up here, and the `Display` output is the description shown
/// to the user after `"Error: "`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestFailure {
    /// Connection, DNS or body read errors.
    #[error("{0}")]
    Transport(String),

    /// The service answered with a non-success status code.
    #[error("Request failed with status code {0}")]
    Status(u16),

    /// The service answered but the body had no usable `answer` field.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// No answer arrived within the configured bound.
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl RequestFailure {
    /// Text used for the assistant turn that replaces a missing answer.
    pub fn to_turn_content(&self) -> String {
        format!("Error: {}", self)
    }
}

impl From<reqwest::Error> for RequestFailure {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Status(status.as_u16());
        }
        if err.is_decode() {
            return Self::Malformed(err.to_string());
        }
        Self::Transport(err.to_string())
    }
}

/// Errors raised while assembling the client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid service url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported url scheme '{0}', expected http or https")]
    UnsupportedScheme(String),

    #[error("invalid timeout '{0}', expected a positive number of seconds")]
    InvalidTimeout(String),

    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
