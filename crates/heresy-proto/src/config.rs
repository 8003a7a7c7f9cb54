//! Agent configuration shared between controller and agent

use serde::{Deserialize, Serialize};

/// Configuration embedded into the agent core script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeresyConfig {
    /// HTTP logging (handled by application-layer hooks, not by this crate)
    #[serde(default)]
    pub http: bool,
    /// React Native element inspection (disabled)
    #[serde(default)]
    pub react_native_elements: bool,
    /// Controller address, e.g. `ws://10.0.2.2:1337`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc: Option<String>,
}

impl HeresyConfig {
    /// Controller address when the channel is enabled
    ///
    /// An empty `rpc` string counts as disabled.
    pub fn rpc_url(&self) -> Option<&str> {
        self.rpc.as_deref().filter(|url| !url.is_empty())
    }
}
