//! Global evaluation scope

use crate::error::EvalError;
use crate::expr;
use serde_json::{Map, Value};
use tracing::warn;

/// The global execution context commands operate on
///
/// The dispatcher owns exactly one scope for its whole lifetime; every
/// `eval` runs against it and sees the effects of previous ones.
pub trait EvalScope: Send {
    /// Evaluate an expression in the global scope
    fn evaluate(&mut self, expression: &str) -> Result<Value, EvalError>;

    /// Names of every property on the global object
    fn property_names(&self) -> Result<Vec<String>, EvalError>;

    /// Best-effort string rendering of one global property
    fn describe_property(&self, name: &str) -> Result<String, EvalError>;

    /// The process-environment object exposed by the scope, if any
    fn environment(&self) -> Option<Value>;

    /// Show a synchronous notification to the user of the target
    fn alert(&mut self, text: &str);
}

/// In-process global scope backed by a map of JSON values
#[derive(Debug, Clone, Default)]
pub struct GlobalScope {
    globals: Map<String, Value>,
    alerts: Vec<String>,
}

impl GlobalScope {
    /// Create an empty scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope whose `process.env` mirrors this process' environment
    pub fn from_process() -> Self {
        // Variables that are not valid UTF-8 are left out.
        let env: Map<String, Value> = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, Value::String(value.into_string().ok()?))))
            .collect();
        Self::new().with_global("process", serde_json::json!({ "env": env }))
    }

    /// Add a global binding
    pub fn with_global(mut self, name: impl Into<String>, value: Value) -> Self {
        self.globals.insert(name.into(), value);
        self
    }

    /// Look up a global binding
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Every alert shown so far, oldest first
    pub fn alerts(&self) -> &[String] {
        &self.alerts
    }
}

impl EvalScope for GlobalScope {
    fn evaluate(&mut self, expression: &str) -> Result<Value, EvalError> {
        let parsed = expr::parse(expression)?;
        expr::evaluate(&parsed, &mut self.globals)
    }

    fn property_names(&self) -> Result<Vec<String>, EvalError> {
        Ok(self.globals.keys().cloned().collect())
    }

    fn describe_property(&self, name: &str) -> Result<String, EvalError> {
        self.globals
            .get(name)
            .map(expr::display)
            .ok_or_else(|| EvalError::Reference(name.to_string()))
    }

    fn environment(&self) -> Option<Value> {
        self.globals.get("process").cloned()
    }

    fn alert(&mut self, text: &str) {
        warn!(target: "heresy_agent::alert", "{}", text);
        self.alerts.push(text.to_string());
    }
}
