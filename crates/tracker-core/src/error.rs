//! Error types for the core module

use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// Remote store query or mutation failed
    #[error("Store error: {0}")]
    Store(String),

    /// Change feed could not be established
    #[error("Feed error: {0}")]
    Feed(String),

    /// Message not present in the canonical list
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed row payload
    #[error("Invalid message payload: {0}")]
    InvalidPayload(String),

    /// The engine is no longer running
    #[error("Dashboard engine stopped")]
    EngineStopped,

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::InvalidPayload(e.to_string())
    }
}
