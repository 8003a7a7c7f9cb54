//! # Heresy
//!
//! Controller side of the Heresy control channel.
//!
//! Agents running inside instrumented targets connect back to a
//! [`BroadcastServer`]; every line the operator types is relayed to all of
//! them as an `eval` and their responses are logged.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use heresy_proto as proto;

/// Error types for the controller
pub mod error;

/// Controller configuration and script loading
pub mod config;

/// Registry of connected agents
pub mod registry;

/// WebSocket server relaying operator commands to agents
pub mod server;

/// Operator console loop
pub mod console;

/// Events reported by the host instrumentation engine
pub mod events;

pub use config::AppConfig;
pub use console::ConsoleAction;
pub use error::HeresyError;
pub use events::handle_host_event;
pub use registry::ConnectionRegistry;
pub use server::{BroadcastServer, InboundEvent, InboundOutcome};

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, HeresyError>;
