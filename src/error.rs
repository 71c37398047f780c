//! Error types and handling for the groundwork helpers

use std::io;
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error;

/// Custom result type for groundwork operations
pub type Result<T> = StdResult<T, Error>;

/// Core error type for groundwork operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("Invalid logging configuration: {0}")]
    InvalidConfig(String),

    #[error("Logging already initialized")]
    AlreadyInitialized,

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// True when the error means the requested configuration file is absent,
    /// as opposed to unreadable or malformed.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ConfigNotFound { .. })
    }
}
