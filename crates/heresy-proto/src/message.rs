//! Message types and the JSON envelope
//!
//! Every frame on the channel is one JSON object of the shape
//! `{"type": <string>, "payload": <any>}`. The set of recognized types is
//! closed; anything else decodes to [`Message::Unrecognized`] so that
//! consumers can log and drop it without failing the connection.

use crate::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Raw wire envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type tag
    #[serde(rename = "type")]
    pub kind: String,
    /// Arbitrary payload; absent payloads decode as `null`
    #[serde(default)]
    pub payload: Value,
}

/// Recognized message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Evaluate an expression on the agent
    Eval,
    /// Result of an evaluation
    EvalResponse,
    /// Free-form log line
    Log,
    /// Show a notification inside the target
    Alert,
    /// Dump the properties of the global scope
    DumpThis,
    /// Dump the process environment
    DumpEnv,
}

impl MessageType {
    /// Every recognized type, in wire order
    pub const ALL: [MessageType; 6] = [
        MessageType::Eval,
        MessageType::EvalResponse,
        MessageType::Log,
        MessageType::Alert,
        MessageType::DumpThis,
        MessageType::DumpEnv,
    ];

    /// Wire name of this type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eval => "eval",
            Self::EvalResponse => "eval_response",
            Self::Log => "log",
            Self::Alert => "alert",
            Self::DumpThis => "dump_this",
            Self::DumpEnv => "dump_env",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProtocolError::Unrecognized(s.to_string()))
    }
}

/// A decoded protocol message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Expression to evaluate in the agent's global scope
    Eval(String),
    /// Evaluation result; failures carry `{"error": "<message>"}`
    EvalResponse(Value),
    /// Log output
    Log(Value),
    /// Notification text
    Alert(Value),
    /// Request a dump of the global scope
    DumpThis,
    /// Request a dump of the process environment
    DumpEnv,
    /// A message whose type is outside the recognized set
    Unrecognized {
        /// The type tag as received
        kind: String,
        /// The payload as received
        payload: Value,
    },
}

impl Message {
    /// Create an eval request
    pub fn eval(expression: impl Into<String>) -> Self {
        Self::Eval(expression.into())
    }

    /// Create a log message from a line of text
    pub fn log(line: impl Into<String>) -> Self {
        Self::Log(Value::String(line.into()))
    }

    /// Create the response for a failed evaluation
    pub fn eval_error(message: impl fmt::Display) -> Self {
        Self::EvalResponse(serde_json::json!({ "error": message.to_string() }))
    }

    /// Type of this message, `None` when unrecognized
    pub fn message_type(&self) -> Option<MessageType> {
        match self {
            Self::Eval(_) => Some(MessageType::Eval),
            Self::EvalResponse(_) => Some(MessageType::EvalResponse),
            Self::Log(_) => Some(MessageType::Log),
            Self::Alert(_) => Some(MessageType::Alert),
            Self::DumpThis => Some(MessageType::DumpThis),
            Self::DumpEnv => Some(MessageType::DumpEnv),
            Self::Unrecognized { .. } => None,
        }
    }

    /// Wire name of the type tag
    pub fn kind(&self) -> &str {
        match self {
            Self::Unrecognized { kind, .. } => kind.as_str(),
            other => other
                .message_type()
                .map(|t| t.as_str())
                .unwrap_or_default(),
        }
    }

    /// Whether this message may be emitted by a producer
    pub fn is_recognized(&self) -> bool {
        self.message_type().is_some()
    }
}

impl TryFrom<Envelope> for Message {
    type Error = ProtocolError;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        let kind = match envelope.kind.parse::<MessageType>() {
            Ok(kind) => kind,
            Err(_) => {
                return Ok(Self::Unrecognized {
                    kind: envelope.kind,
                    payload: envelope.payload,
                })
            }
        };

        let message = match kind {
            // Non-string payloads are evaluated as their JSON text.
            MessageType::Eval => match envelope.payload {
                Value::String(expression) => Self::Eval(expression),
                other => Self::Eval(other.to_string()),
            },
            MessageType::EvalResponse => Self::EvalResponse(envelope.payload),
            MessageType::Log => Self::Log(envelope.payload),
            MessageType::Alert => Self::Alert(envelope.payload),
            MessageType::DumpThis => Self::DumpThis,
            MessageType::DumpEnv => Self::DumpEnv,
        };
        Ok(message)
    }
}

impl TryFrom<Message> for Envelope {
    type Error = ProtocolError;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        let (kind, payload) = match message {
            Message::Eval(expression) => (MessageType::Eval, Value::String(expression)),
            Message::EvalResponse(value) => (MessageType::EvalResponse, value),
            Message::Log(value) => (MessageType::Log, value),
            Message::Alert(value) => (MessageType::Alert, value),
            Message::DumpThis => (MessageType::DumpThis, Value::Null),
            Message::DumpEnv => (MessageType::DumpEnv, Value::Null),
            Message::Unrecognized { kind, .. } => return Err(ProtocolError::Unrecognized(kind)),
        };
        Ok(Envelope {
            kind: kind.as_str().to_string(),
            payload,
        })
    }
}

/// Serialize a message into one text frame
pub fn encode(message: &Message) -> Result<String, ProtocolError> {
    let envelope = Envelope::try_from(message.clone())?;
    Ok(serde_json::to_string(&envelope)?)
}

/// Parse one text frame
///
/// Unknown type tags are not an error: they come back as
/// [`Message::Unrecognized`]. Only frames that are not an object with a
/// string `type` fail.
pub fn decode(text: &str) -> Result<Message, ProtocolError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    Message::try_from(envelope)
}
