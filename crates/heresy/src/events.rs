//! Events reported by the host instrumentation engine
//!
//! The instrumentation engine that attaches to the target is not part of
//! this crate. Its message callback is the caller of [`handle_host_event`]:
//! it passes every structured message the injected script posts, unchanged.
//! Only [`HostEvent::HookLoaded`] has a handler.

use heresy_proto::HostEvent;
use serde_json::Value;
use tracing::{info, warn};

/// Log a message relayed from the injected script
///
/// Returns the event when it is one the controller knows.
pub fn handle_host_event(message: &Value) -> Option<HostEvent> {
    match serde_json::from_value::<HostEvent>(message.clone()) {
        Ok(HostEvent::HookLoaded) => {
            info!("Hermes hook was loaded successfully");
            Some(HostEvent::HookLoaded)
        }
        Err(_) => {
            warn!("Unhandled message from injected script: {}", message);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hook_loaded() {
        let event = handle_host_event(&json!({"type": "hermes_hook_loaded"}));
        assert_eq!(event, Some(HostEvent::HookLoaded));
    }

    #[test]
    fn test_other_messages_unhandled() {
        assert_eq!(handle_host_event(&json!({"type": "send", "payload": 1})), None);
        assert_eq!(handle_host_event(&json!("hermes_hook_loaded")), None);
    }

    #[test]
    fn test_engine_message_text() {
        // The engine delivers the posted message as JSON text.
        let message: Value = serde_json::from_str(r#"{"type":"hermes_hook_loaded"}"#).unwrap();
        assert_eq!(handle_host_event(&message), Some(HostEvent::HookLoaded));
    }

    #[test]
    fn test_round_trip_from_sequencer_event() {
        let value = serde_json::to_value(HostEvent::HookLoaded).unwrap();
        assert_eq!(handle_host_event(&value), Some(HostEvent::HookLoaded));
    }
}
