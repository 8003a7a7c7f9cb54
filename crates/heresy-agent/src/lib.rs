//! # Heresy Agent
//!
//! Code that runs inside the instrumented target: the reconnecting channel
//! to the controller, the command dispatcher and the evaluation scope it
//! operates on.

#![warn(missing_docs)]

/// Agent runtime wiring channel and dispatcher together
pub mod agent;

/// Reconnecting WebSocket channel to the controller
pub mod channel;

/// Command dispatch for inbound messages
pub mod dispatcher;

/// Expression language used by `eval`
pub mod expr;

/// Global evaluation scope
pub mod scope;

/// Error types for the agent
pub mod error;

pub use agent::Agent;
pub use channel::{Channel, ChannelConfig, ChannelSender, ChannelState};
pub use dispatcher::Dispatcher;
pub use error::{ChannelError, EvalError};
pub use scope::{EvalScope, GlobalScope};
