//! Events reported through the host instrumentation engine
//!
//! These never travel over the control channel. The injection sequencer hands
//! them to the instrumentation engine, which forwards them to the controller.

use serde::{Deserialize, Serialize};

/// Structured event emitted by the target side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// Before, main and after stages were all loaded
    #[serde(rename = "hermes_hook_loaded")]
    HookLoaded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_loaded_wire_shape() {
        let text = serde_json::to_string(&HostEvent::HookLoaded).unwrap();
        assert_eq!(text, r#"{"type":"hermes_hook_loaded"}"#);

        let parsed: HostEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, HostEvent::HookLoaded);
    }

    #[test]
    fn test_unknown_event_rejected() {
        assert!(serde_json::from_str::<HostEvent>(r#"{"type":"other"}"#).is_err());
    }
}
