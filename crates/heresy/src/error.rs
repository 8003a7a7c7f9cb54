//! Error types for the controller

use thiserror::Error;

/// Main error type for controller operations
#[derive(Debug, Error)]
pub enum HeresyError {
    /// Configuration file missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Protocol-related errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] heresy_proto::ProtocolError),

    /// Injection parameter errors
    #[error("Injection error: {0}")]
    Inject(#[from] heresy_inject::InjectError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for HeresyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON error: {}", err))
    }
}
