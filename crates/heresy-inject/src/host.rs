//! Contract of the host instrumentation engine
//!
//! The engine that attaches to the target is external. It exposes class
//! resolution, method interception and an event channel back to the
//! controller; the sequencer only talks to it through [`RuntimeHost`].

use crate::InjectError;
use heresy_proto::HostEvent;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// One signature variant of a target method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Overload {
    /// Fully qualified class name
    pub class: String,
    /// Method name
    pub method: String,
    /// Parameter types, in declaration order
    pub signature: Vec<String>,
}

impl Overload {
    /// Create an overload descriptor
    pub fn new(class: impl Into<String>, method: impl Into<String>, signature: &[&str]) -> Self {
        Self {
            class: class.into(),
            method: method.into(),
            signature: signature.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl fmt::Display for Overload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({})", self.class, self.method, self.signature.join(", "))
    }
}

/// A single call into a hooked method
///
/// Implemented by the host for the duration of one intercepted call; the
/// arguments of the call stay with the host.
pub trait Invocation {
    /// The overload that fired
    fn overload(&self) -> &Overload;

    /// Run the replaced implementation with the original arguments
    fn call_original(&mut self) -> Result<(), InjectError>;

    /// Ask the receiver to load a script from a file on the target
    fn load_script_from_file(&mut self, path: &Path) -> Result<(), InjectError>;
}

/// Replacement implementation installed on an overload
///
/// `invoke` runs on the target's own thread in place of the original
/// method. It must not panic and has no way to report failure.
pub trait EntryPointHook: Send + Sync {
    /// Handle one intercepted call
    fn invoke(&self, call: &mut dyn Invocation);
}

/// Surface of the instrumentation engine used by the sequencer
pub trait RuntimeHost: Send + Sync {
    /// Whether `class` can currently be resolved in the target
    fn is_resolvable(&self, class: &str) -> bool;

    /// Replace the implementation of `overload` with `hook`
    fn install(&self, overload: &Overload, hook: Arc<dyn EntryPointHook>) -> Result<(), InjectError>;

    /// Report an event to the controller
    fn emit(&self, event: HostEvent);
}
