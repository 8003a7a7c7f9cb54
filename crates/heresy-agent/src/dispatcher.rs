//! Command dispatch for inbound messages

use crate::scope::EvalScope;
use heresy_proto::Message;
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// Interprets inbound messages against the global scope
///
/// Dispatch never fails: every fault is turned into a log line or, for
/// `eval`, into an error response.
pub struct Dispatcher<S: EvalScope> {
    scope: S,
}

impl<S: EvalScope> Dispatcher<S> {
    /// Create a dispatcher operating on `scope`
    pub fn new(scope: S) -> Self {
        Self { scope }
    }

    /// Shared access to the scope
    pub fn scope(&self) -> &S {
        &self.scope
    }

    /// Handle one message and return the messages to send back
    pub fn dispatch(&mut self, message: Message) -> Vec<Message> {
        match message {
            Message::Alert(payload) => {
                let text = match payload {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                self.scope.alert(&text);
                Vec::new()
            }
            Message::DumpThis => self.dump_this(),
            Message::DumpEnv => self.dump_env(),
            Message::Eval(expression) => vec![self.eval(&expression)],
            Message::EvalResponse(_) | Message::Log(_) => {
                debug!("Ignoring controller-bound message: {}", message.kind());
                Vec::new()
            }
            Message::Unrecognized { kind, .. } => {
                warn!("Unrecognized message type: {}", kind);
                Vec::new()
            }
        }
    }

    fn eval(&mut self, expression: &str) -> Message {
        match self.scope.evaluate(expression) {
            Ok(value) => {
                debug!("Evaluated `{}` -> {}", expression, value);
                Message::EvalResponse(value)
            }
            Err(e) => {
                warn!("Evaluation of `{}` failed: {}", expression, e);
                Message::eval_error(e)
            }
        }
    }

    fn dump_this(&mut self) -> Vec<Message> {
        let names = match self.scope.property_names() {
            Ok(names) => names,
            Err(e) => {
                error!("Failed to enumerate global properties: {}", e);
                return vec![Message::log(format!("Error: {}", e))];
            }
        };

        names
            .into_iter()
            .map(|name| {
                let line = match self.scope.describe_property(&name) {
                    Ok(value) => format!("{}: {}", name, value),
                    Err(e) => format!("Error: {}: {}", name, e),
                };
                info!("{}", line);
                Message::log(line)
            })
            .collect()
    }

    fn dump_env(&mut self) -> Vec<Message> {
        let line = match self.scope.environment() {
            Some(env) => env.to_string(),
            None => "undefined".to_string(),
        };
        info!("{}", line);
        vec![Message::log(line)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use crate::scope::GlobalScope;
    use serde_json::json;

    /// Scope whose properties partially fail to stringify
    #[derive(Default)]
    struct FlakyScope {
        alerts: usize,
    }

    impl EvalScope for FlakyScope {
        fn evaluate(&mut self, _expression: &str) -> Result<Value, EvalError> {
            Err(EvalError::Type("not callable".into()))
        }

        fn property_names(&self) -> Result<Vec<String>, EvalError> {
            Ok(vec!["ok".into(), "broken".into(), "fine".into()])
        }

        fn describe_property(&self, name: &str) -> Result<String, EvalError> {
            if name == "broken" {
                Err(EvalError::Type("getter threw".into()))
            } else {
                Ok(format!("<{}>", name))
            }
        }

        fn environment(&self) -> Option<Value> {
            None
        }

        fn alert(&mut self, _text: &str) {
            self.alerts += 1;
        }
    }

    #[test]
    fn test_eval_returns_value() {
        let mut dispatcher = Dispatcher::new(GlobalScope::new());
        let out = dispatcher.dispatch(Message::eval("2+2"));
        assert_eq!(out, vec![Message::EvalResponse(json!(4))]);
    }

    #[test]
    fn test_eval_uses_shared_scope() {
        let mut dispatcher = Dispatcher::new(GlobalScope::new());
        dispatcher.dispatch(Message::eval("token = 'abc'"));
        let out = dispatcher.dispatch(Message::eval("token + '!'"));
        assert_eq!(out, vec![Message::EvalResponse(json!("abc!"))]);
    }

    #[test]
    fn test_eval_failure_produces_one_error_response() {
        let mut dispatcher = Dispatcher::new(GlobalScope::new());
        let out = dispatcher.dispatch(Message::eval("(1 +"));
        assert_eq!(out.len(), 1);
        match &out[0] {
            Message::EvalResponse(payload) => {
                assert!(payload["error"].as_str().unwrap().starts_with("SyntaxError"));
            }
            other => panic!("Expected EvalResponse, got {:?}", other),
        }

        let out = dispatcher.dispatch(Message::eval("missing"));
        assert_eq!(
            out,
            vec![Message::EvalResponse(json!({"error": "ReferenceError: missing is not defined"}))]
        );
    }

    #[test]
    fn test_eval_with_numeric_payload_is_answered() {
        let mut dispatcher = Dispatcher::new(GlobalScope::new());
        let message = heresy_proto::decode(r#"{"type":"eval","payload":4}"#).unwrap();
        assert_eq!(dispatcher.dispatch(message), vec![Message::EvalResponse(json!(4))]);

        let message = heresy_proto::decode(r#"{"type":"eval","payload":[1,2]}"#).unwrap();
        let out = dispatcher.dispatch(message);
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Message::EvalResponse(payload) if payload.get("error").is_some()));
    }

    #[test]
    fn test_deeply_nested_eval_is_an_error_response() {
        let mut dispatcher = Dispatcher::new(GlobalScope::new());
        let source = format!("{}1{}", "(".repeat(50_000), ")".repeat(50_000));
        assert_eq!(
            dispatcher.dispatch(Message::eval(source)),
            vec![Message::EvalResponse(json!({"error": "RangeError: expression too deeply nested"}))]
        );

        let out = dispatcher.dispatch(Message::eval(["1"; 200_000].join("+")));
        assert_eq!(
            out,
            vec![Message::EvalResponse(json!({"error": "RangeError: expression too deeply nested"}))]
        );

        // The scope is still usable afterwards.
        assert_eq!(dispatcher.dispatch(Message::eval("2+2")), vec![Message::EvalResponse(json!(4))]);
    }

    #[test]
    fn test_alert_reaches_scope() {
        let mut dispatcher = Dispatcher::new(GlobalScope::new());
        assert!(dispatcher.dispatch(Message::Alert(json!("hi"))).is_empty());
        assert!(dispatcher.dispatch(Message::Alert(json!(42))).is_empty());
        assert_eq!(dispatcher.scope().alerts(), ["hi".to_string(), "42".to_string()]);
    }

    #[test]
    fn test_dump_this_survives_failing_properties() {
        let mut dispatcher = Dispatcher::new(FlakyScope::default());
        let out = dispatcher.dispatch(Message::DumpThis);
        assert_eq!(
            out,
            vec![
                Message::log("ok: <ok>"),
                Message::log("Error: broken: TypeError: getter threw"),
                Message::log("fine: <fine>"),
            ]
        );
    }

    #[test]
    fn test_dump_env() {
        let scope = GlobalScope::new().with_global("process", json!({"env": {"NODE_ENV": "dev"}}));
        let mut dispatcher = Dispatcher::new(scope);
        let out = dispatcher.dispatch(Message::DumpEnv);
        assert_eq!(out, vec![Message::log(r#"{"env":{"NODE_ENV":"dev"}}"#)]);

        let mut dispatcher = Dispatcher::new(FlakyScope::default());
        assert_eq!(dispatcher.dispatch(Message::DumpEnv), vec![Message::log("undefined")]);
    }

    #[test]
    fn test_unrecognized_is_a_no_op() {
        let mut dispatcher = Dispatcher::new(FlakyScope::default());
        let out = dispatcher.dispatch(Message::Unrecognized {
            kind: "reboot".into(),
            payload: json!({"now": true}),
        });
        assert!(out.is_empty());
        assert_eq!(dispatcher.scope().alerts, 0);
    }

    #[test]
    fn test_controller_bound_messages_ignored() {
        let mut dispatcher = Dispatcher::new(GlobalScope::new());
        assert!(dispatcher.dispatch(Message::EvalResponse(json!(1))).is_empty());
        assert!(dispatcher.dispatch(Message::log("x")).is_empty());
    }
}
