//! JSON-RPC 2.0 envelopes
//!
//! Inbound bodies are classified once, at decode time, into a [`Message`]
//! so nothing downstream has to re-inspect raw JSON shapes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::debug;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Request identifier: JSON-RPC allows numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    /// Numeric view used for correlation. Numeric strings are accepted
    /// because some servers echo ids back as strings.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            RequestId::Number(n) => u64::try_from(*n).ok(),
            RequestId::String(s) => s.parse().ok(),
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RequestId::Number),
            Value::String(s) => Some(RequestId::String(s.clone())),
            _ => None,
        }
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        RequestId::Number(id as i64)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("Method not found: {}", method),
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub outcome: Result<Value, ErrorObject>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Option<Value>,
}

/// A decoded JSON-RPC message.
///
/// `Request` covers both directions: outbound client requests and
/// server-to-client requests arriving on the read side.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

impl Message {
    pub fn request(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Message::Request(Request {
            id: id.into(),
            method: method.into(),
            params,
        })
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Message::Notification(Notification {
            method: method.into(),
            params,
        })
    }

    pub fn response(id: RequestId, outcome: Result<Value, ErrorObject>) -> Self {
        Message::Response(Response { id, outcome })
    }

    /// Classify a parsed body.
    ///
    /// `id` + `method` is a server request, `id` alone a response, `method`
    /// alone a notification. Anything else yields `None` and is dropped by
    /// the caller.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut obj) = value else {
            debug!("Discarding non-object JSON-RPC body");
            return None;
        };

        let id = obj.get("id").and_then(RequestId::from_value);
        let method = match obj.remove("method") {
            Some(Value::String(m)) => Some(m),
            _ => None,
        };

        match (id, method) {
            (Some(id), Some(method)) => Some(Message::Request(Request {
                id,
                method,
                params: obj.remove("params"),
            })),
            (Some(id), None) => {
                let outcome = match obj.remove("error") {
                    Some(error) => Err(serde_json::from_value::<ErrorObject>(error.clone())
                        .unwrap_or_else(|_| ErrorObject {
                            code: INTERNAL_ERROR,
                            message: format!("malformed error object: {}", error),
                            data: None,
                        })),
                    None => Ok(obj.remove("result").unwrap_or(Value::Null)),
                };
                Some(Message::Response(Response { id, outcome }))
            }
            (None, Some(method)) => Some(Message::Notification(Notification {
                method,
                params: obj.remove("params"),
            })),
            (None, None) => {
                debug!("Discarding JSON-RPC body with neither id nor method");
                None
            }
        }
    }

    /// Build the wire envelope.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("jsonrpc".into(), json!(JSONRPC_VERSION));

        match self {
            Message::Request(req) => {
                obj.insert("id".into(), json!(req.id));
                obj.insert("method".into(), json!(req.method));
                if let Some(params) = &req.params {
                    obj.insert("params".into(), params.clone());
                }
            }
            Message::Response(resp) => {
                obj.insert("id".into(), json!(resp.id));
                match &resp.outcome {
                    Ok(result) => {
                        obj.insert("result".into(), result.clone());
                    }
                    Err(error) => {
                        obj.insert("error".into(), json!(error));
                    }
                }
            }
            Message::Notification(note) => {
                obj.insert("method".into(), json!(note.method));
                if let Some(params) = &note.params {
                    obj.insert("params".into(), params.clone());
                }
            }
        }

        Value::Object(obj)
    }

    /// Method name for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request(req) => Some(&req.method),
            Message::Notification(note) => Some(&note.method),
            Message::Response(_) => None,
        }
    }
}
