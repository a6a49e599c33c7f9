use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Anything that stops a run before (or instead of) producing a report.
///
/// Individual request failures are not errors; see `dispatch::Failure`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{0} must be a positive integer")]
    NotPositive(&'static str),

    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },

    #[error("failed to read config file {}: {source}", .path.display())]
    ConfigFile { path: PathBuf, source: io::Error },

    #[error("failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to set up logging: {0}")]
    Logger(#[from] log::SetLoggerError),

    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn invalid_value(name: &'static str, value: impl Into<String>) -> Self {
        Error::InvalidValue {
            name,
            value: value.into(),
        }
    }
}
