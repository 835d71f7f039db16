use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8000/query";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const SERVICE_URL_ENV: &str = "STUDYBUDDY_SERVICE_URL";
pub const TIMEOUT_ENV: &str = "STUDYBUDDY_TIMEOUT_SECS";

/// Resolved settings for talking to the answer service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub service_url: Url,
    pub request_timeout: Duration,
}

/// Shape of `config.json`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub service_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Values supplied by one layer above the config file (environment or CLI).
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub service_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Overrides {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let timeout_secs = match lookup(TIMEOUT_ENV) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?,
            ),
            None => None,
        };

        Ok(Self {
            service_url: lookup(SERVICE_URL_ENV).filter(|url| !url.trim().is_empty()),
            timeout_secs,
        })
    }
}

impl ClientConfig {
    /// Load the configuration, highest precedence first: CLI flags, then
    /// environment, then the config file, then built-in defaults.
    ///
    /// An explicitly named config file must exist. The default location is
    /// only read when present.
    pub fn load(config_path: Option<&Path>, cli: &Overrides) -> Result<Self, ConfigError> {
        let file = match config_path {
            Some(path) => read_file(path)?,
            None => match default_config_path().filter(|path| path.exists()) {
                Some(path) => read_file(&path)?,
                None => FileConfig::default(),
            },
        };

        Self::resolve(file, Overrides::from_env()?, cli)
    }

    pub fn resolve(
        file: FileConfig,
        env: Overrides,
        cli: &Overrides,
    ) -> Result<Self, ConfigError> {
        let raw_url = cli
            .service_url
            .clone()
            .or(env.service_url)
            .or(file.service_url)
            .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string());

        let timeout_secs = cli
            .timeout_secs
            .or(env.timeout_secs)
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        if timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(timeout_secs.to_string()));
        }

        let config = Self {
            service_url: parse_service_url(&raw_url)?,
            request_timeout: Duration::from_secs(timeout_secs),
        };
        debug!(
            "Resolved config: url={}, timeout={}s",
            config.service_url, timeout_secs
        );
        Ok(config)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_url: Url::parse(DEFAULT_SERVICE_URL).expect("default url is valid"),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("studybuddy").join("config.json"))
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_service_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl {
        url: raw.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}
