//! Error types for the agent

use thiserror::Error;

/// Errors raised while evaluating operator expressions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Expression could not be parsed
    #[error("SyntaxError: {0}")]
    Syntax(String),

    /// Identifier not present in the scope
    #[error("ReferenceError: {0} is not defined")]
    Reference(String),

    /// Operation applied to values of the wrong kind
    #[error("TypeError: {0}")]
    Type(String),

    /// Result cannot be represented as a JSON value
    #[error("RangeError: {0}")]
    Range(String),
}

/// Channel-level errors
#[derive(Debug, Error)]
pub enum ChannelError {
    /// WebSocket handshake or transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// Peer closed the connection
    #[error("Connection closed by peer{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Closed(Option<String>),

    /// Local shutdown was requested
    #[error("Channel shut down")]
    Shutdown,
}
