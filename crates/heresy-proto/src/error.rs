//! Error types for protocol operations

use thiserror::Error;

/// Protocol-specific errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame is not valid JSON or not an object with a string `type`
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Attempt to emit a message whose type is outside the recognized set
    #[error("Refusing to encode unrecognized message type `{0}`")]
    Unrecognized(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
