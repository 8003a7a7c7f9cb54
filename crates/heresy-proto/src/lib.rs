//! # Heresy Protocol
//!
//! Message envelope, host instrumentation events and shared agent configuration
//! for the Heresy control channel.

#![warn(missing_docs)]

/// Message types and the JSON envelope
pub mod message;

/// Events reported through the host instrumentation engine
pub mod event;

/// Agent configuration shared between controller and agent
pub mod config;

/// Error types for protocol operations
pub mod error;

pub use config::HeresyConfig;
pub use error::ProtocolError;
pub use event::HostEvent;
pub use message::{decode, encode, Envelope, Message, MessageType};
