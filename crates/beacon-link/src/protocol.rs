//! JSON text frames exchanged with the hub.
//!
//! Client frames are a closed set. Server frames are parsed leniently: any
//! `type` that is not part of the hub protocol is treated as a channel event
//! and forwarded with the whole frame as its payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::errors::TransportError;

/// Frame sent from client to server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Correlated hub method call.
    Invocation {
        /// Correlation id echoed in the completion.
        #[serde(rename = "invocationId")]
        invocation_id: String,
        /// Hub method name.
        target: String,
        /// Positional arguments.
        #[serde(default)]
        arguments: Vec<Value>,
    },
    /// Fire-and-forget message.
    Send {
        /// Event name.
        event: String,
        /// Payload.
        #[serde(default)]
        data: Value,
    },
    /// Keepalive.
    Ping,
}

impl ClientFrame {
    /// Encode as a text frame.
    pub fn to_text(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Protocol(e.to_string()))
    }

    /// Decode a text frame (server side).
    pub fn parse(text: &str) -> Result<Self, TransportError> {
        serde_json::from_str(text).map_err(|e| TransportError::Protocol(e.to_string()))
    }
}

/// Frame received from the server.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerFrame {
    /// Result of an earlier invocation.
    Completion {
        /// Correlation id of the invocation.
        invocation_id: String,
        /// Result value, absent for void methods.
        result: Option<Value>,
        /// Error text when the invocation failed.
        error: Option<String>,
    },
    /// Server-to-client hub event.
    Invocation {
        /// Event name.
        target: String,
        /// Positional arguments.
        arguments: Vec<Value>,
    },
    /// Server keepalive.
    Ping,
    /// Answer to a client keepalive.
    Pong,
    /// Server is closing the connection.
    Close {
        /// Reason, when supplied.
        error: Option<String>,
    },
    /// Any other typed message, forwarded verbatim.
    Event {
        /// The frame's `type`.
        event: String,
        /// The whole frame.
        payload: Value,
    },
}

impl ServerFrame {
    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, TransportError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| TransportError::Protocol(e.to_string()))?;
        Self::from_value(value)
    }

    /// Decode an already-parsed frame.
    pub fn from_value(value: Value) -> Result<Self, TransportError> {
        let Value::Object(mut fields) = value else {
            return Err(TransportError::Protocol("frame is not an object".into()));
        };
        let kind = match fields.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            _ => return Err(TransportError::Protocol("frame has no type".into())),
        };

        match kind.as_str() {
            "completion" => {
                let invocation_id = take_string(&mut fields, "invocationId")
                    .ok_or_else(|| TransportError::Protocol("completion without invocationId".into()))?;
                let result = fields.remove("result").filter(|v| !v.is_null());
                let error = fields.remove("error").and_then(error_text);
                Ok(Self::Completion {
                    invocation_id,
                    result,
                    error,
                })
            }
            "invocation" => {
                let target = take_string(&mut fields, "target")
                    .ok_or_else(|| TransportError::Protocol("invocation without target".into()))?;
                let arguments = match fields.remove("arguments") {
                    Some(Value::Array(args)) => args,
                    None | Some(Value::Null) => Vec::new(),
                    Some(other) => vec![other],
                };
                Ok(Self::Invocation { target, arguments })
            }
            "ping" => Ok(Self::Ping),
            "pong" => Ok(Self::Pong),
            "close" => Ok(Self::Close {
                error: fields.remove("error").and_then(error_text),
            }),
            _ => Ok(Self::Event {
                event: kind,
                payload: Value::Object(fields),
            }),
        }
    }

    /// Encode as a JSON value (server side).
    pub fn to_value(&self) -> Value {
        match self {
            Self::Completion {
                invocation_id,
                result,
                error,
            } => {
                let mut frame = json!({"type": "completion", "invocationId": invocation_id});
                if let Some(result) = result {
                    frame["result"] = result.clone();
                }
                if let Some(error) = error {
                    frame["error"] = Value::String(error.clone());
                }
                frame
            }
            Self::Invocation { target, arguments } => {
                json!({"type": "invocation", "target": target, "arguments": arguments})
            }
            Self::Ping => json!({"type": "ping"}),
            Self::Pong => json!({"type": "pong"}),
            Self::Close { error } => match error {
                Some(error) => json!({"type": "close", "error": error}),
                None => json!({"type": "close"}),
            },
            Self::Event { payload, .. } => payload.clone(),
        }
    }

    /// Encode as a text frame (server side).
    pub fn to_text(&self) -> String {
        self.to_value().to_string()
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn error_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Object(ref obj) => Some(
            obj.get("message")
                .and_then(Value::as_str)
                .map_or_else(|| value.to_string(), str::to_owned),
        ),
        other => Some(other.to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
