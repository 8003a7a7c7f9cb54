//! Injection parameters handed over by the controller

use crate::InjectError;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Raw parameters as passed to the target-side `init` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionParams {
    /// Package identifier of the target application
    #[serde(default)]
    pub package_name: Option<String>,
    /// Script loaded before the application bundle
    #[serde(default)]
    pub hermes_before: Option<String>,
    /// Script loaded right after the application bundle
    #[serde(default)]
    pub hermes_hook: Option<String>,
}

/// Validated payloads ready for injection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payloads {
    /// Package identifier of the target application
    pub package_name: String,
    /// Before-stage script; empty when none was given
    pub before: String,
    /// After-stage script
    pub after: String,
}

impl InjectionParams {
    /// Check preconditions and produce the payloads
    pub fn validate(self) -> Result<Payloads, InjectError> {
        let package_name = match self.package_name {
            Some(name) if !name.is_empty() => name,
            _ => {
                error!("package_name is required");
                return Err(InjectError::MissingPackageName);
            }
        };

        let after = match self.hermes_hook {
            Some(script) => script,
            None => {
                error!("hermes_hook is required");
                return Err(InjectError::MissingMainHook);
            }
        };

        Ok(Payloads {
            package_name,
            before: self.hermes_before.unwrap_or_default(),
            after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_complete() {
        let params = InjectionParams {
            package_name: Some("com.example.app".into()),
            hermes_before: None,
            hermes_hook: Some("h.alert('hi')".into()),
        };
        let payloads = params.validate().unwrap();
        assert_eq!(payloads.package_name, "com.example.app");
        assert_eq!(payloads.before, "");
        assert_eq!(payloads.after, "h.alert('hi')");
    }

    #[test]
    fn test_missing_package_name() {
        let params = InjectionParams {
            hermes_hook: Some("x".into()),
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(InjectError::MissingPackageName)));

        let params = InjectionParams {
            package_name: Some(String::new()),
            hermes_hook: Some("x".into()),
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(InjectError::MissingPackageName)));
    }

    #[test]
    fn test_missing_main_hook() {
        let params = InjectionParams {
            package_name: Some("com.example.app".into()),
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(InjectError::MissingMainHook)));
    }

    #[test]
    fn test_deserialize_init_params() {
        let params: InjectionParams = serde_json::from_str(
            r#"{"package_name":"com.example.app","hermes_hook":"main","config":{"http":true}}"#,
        )
        .unwrap();
        assert_eq!(params.package_name.as_deref(), Some("com.example.app"));
        assert_eq!(params.hermes_before, None);
    }
}
