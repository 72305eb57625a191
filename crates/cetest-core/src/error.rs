//! Error types for cetest-core

use thiserror::Error;

/// Errors that can occur in cetest-core
#[derive(Error, Debug)]
pub enum CoreError {
    /// The run was cancelled by the user
    #[error("cancelled by user")]
    Cancelled,

    /// Compilation service error
    #[error("compilation service error: {0}")]
    Client(#[from] ce_client::CeError),

    /// Flattening error
    #[error("flatten error: {0}")]
    Flatten(#[from] tu_flatten::FlattenError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Report could not be read or interpreted
    #[error("invalid report: {0}")]
    Report(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl CoreError {
    /// Cancellation from any layer.
    pub fn is_cancelled(&self) -> bool {
        match self {
            CoreError::Cancelled => true,
            CoreError::Client(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

/// Result type for cetest-core operations
pub type Result<T> = std::result::Result<T, CoreError>;
