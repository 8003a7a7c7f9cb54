//! Controller configuration and script loading

use crate::{HeresyError, Result};
use heresy_inject::InjectionParams;
use heresy_proto::HeresyConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default location of the controller configuration
pub const DEFAULT_CONFIG_PATH: &str = ".heresy/heresy.json";

/// Default location of the built agent core script
pub const DEFAULT_CORE_PATH: &str = "dist/_hermes_agent.js";

/// Marker in the agent core replaced by the serialized [`HeresyConfig`]
pub const CONFIG_PLACEHOLDER: &str = "\"REPLACED_VIA_CODE\"";

/// Controller configuration file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Package identifier of the target application
    pub package_name: String,
    /// Script to load before the application bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hermes_before: Option<PathBuf>,
    /// Script to load right after the application bundle
    pub hermes_hook: PathBuf,
    /// Port the broadcast server listens on
    pub rpc_port: u16,
    /// Configuration embedded into the agent core
    #[serde(default)]
    pub heresy_config: HeresyConfig,
}

impl AppConfig {
    /// Load the configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HeresyError::Config(format!("{} does not exist", path.display())));
        }
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse the configuration from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| HeresyError::Config(e.to_string()))
    }
}

/// Substitute the placeholder in the agent core with `config`
///
/// The configuration is inserted as a single-quoted JavaScript string
/// literal holding its JSON serialization.
pub fn embed_config(core: &str, config: &HeresyConfig) -> Result<String> {
    let json = serde_json::to_string(config)?;
    let literal = format!("'{}'", json.replace('\\', "\\\\").replace('\'', "\\'"));
    Ok(core.replace(CONFIG_PLACEHOLDER, &literal))
}

/// Read every script the target needs and assemble the injection parameters
///
/// The main hook is the agent core (with the configuration embedded)
/// followed by the user's hook script.
pub fn read_scripts(config: &AppConfig, core_path: &Path) -> Result<InjectionParams> {
    let core = fs::read_to_string(core_path).map_err(|e| {
        HeresyError::Config(format!("cannot read agent core {}: {}", core_path.display(), e))
    })?;
    let core = embed_config(&core, &config.heresy_config)?;

    let hermes_before = match &config.hermes_before {
        Some(path) => Some(fs::read_to_string(path).map_err(|e| {
            HeresyError::Config(format!("cannot read hermes_before {}: {}", path.display(), e))
        })?),
        None => None,
    };

    let hook = fs::read_to_string(&config.hermes_hook).map_err(|e| {
        HeresyError::Config(format!(
            "cannot read hermes_hook {}: {}",
            config.hermes_hook.display(),
            e
        ))
    })?;

    debug!(
        core = core.len(),
        before = hermes_before.as_ref().map(String::len),
        hook = hook.len(),
        "Read injection scripts"
    );

    Ok(InjectionParams {
        package_name: Some(config.package_name.clone()),
        hermes_before,
        hermes_hook: Some([core, hook].join("\n")),
    })
}
