//! Error types for injection

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Injection errors
#[derive(Debug, Error)]
pub enum InjectError {
    /// No package identifier was supplied
    #[error("package_name is required")]
    MissingPackageName,

    /// No main hook script was supplied
    #[error("hermes_hook is required")]
    MissingMainHook,

    /// Writing a payload file failed
    #[error("Failed to write payload {}: {source}", path.display())]
    PayloadWrite {
        /// Destination path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The host refused to install a hook
    #[error("Failed to hook {target}: {reason}")]
    Install {
        /// `class.method(signature)` that was targeted
        target: String,
        /// Reason reported by the host
        reason: String,
    },

    /// The host failed to load a script or run the original method
    #[error("Host call failed: {0}")]
    Host(String),
}
