//! Infrastructure error types

use std::path::PathBuf;

use promptgate_common::ConfigError;
use promptgate_domain::PersistenceError;
use thiserror::Error;

/// Failures raised by adapters in this crate
#[derive(Debug, Error)]
pub enum InfraError {
    /// Configuration could not be located or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration parsed but failed validation
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error("I/O error at {path}: {error}")]
    Io { path: PathBuf, error: std::io::Error },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Background worker lifecycle misuse or join failure
    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl InfraError {
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io { path: path.into(), error }
    }
}

/// Result type alias for infrastructure operations
pub type InfraResult<T> = std::result::Result<T, InfraError>;
