//! # Heresy Injection
//!
//! Target-side sequencing that installs the agent into the host's script
//! loading pipeline: wait for the runtime, hook every known entry point
//! overload once, and load the before / main / after stages in order.

#![warn(missing_docs)]

/// Contract of the host instrumentation engine
pub mod host;

/// Injection parameters handed over by the controller
pub mod params;

/// Payload file locations on the target
pub mod paths;

/// The injection state machine
pub mod sequencer;

/// Error types for injection
pub mod error;

#[cfg(test)]
mod test_utils;

pub use error::InjectError;
pub use host::{EntryPointHook, Invocation, Overload, RuntimeHost};
pub use params::{InjectionParams, Payloads};
pub use paths::PayloadPaths;
pub use sequencer::{Sequencer, SequencerConfig, SequencerState};

/// Result type alias for injection operations
pub type Result<T> = std::result::Result<T, InjectError>;
