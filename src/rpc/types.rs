// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! RPC configuration and message shapes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::RpcError;

/// Timeout applied to requests that don't specify one.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

fn default_name() -> String {
    "tool-server".to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

/// Configuration for an [`RpcChannel`](super::RpcChannel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcConfig {
    /// Name used in logs to tell channels apart.
    #[serde(default = "default_name")]
    pub name: String,

    /// Per-request timeout when the caller gives none.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

impl RpcConfig {
    /// Create a config with the given channel name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the default request timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }
}

/// A notification pushed by the far side (a message with a method and no id).
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Option<Value>,
}

/// A message read off the wire, classified by shape.
#[derive(Debug)]
pub(crate) enum Incoming {
    /// Answer to one of our requests.
    Response {
        id: u64,
        outcome: Result<Value, RpcError>,
    },
    /// Server-initiated request; we don't serve any methods.
    Request { id: Value, method: String },
    Notification(Notification),
    /// Valid JSON that is none of the above.
    Unknown(Value),
}

impl Incoming {
    pub(crate) fn classify(mut message: Value) -> Self {
        let method = message
            .get("method")
            .and_then(|m| m.as_str())
            .map(String::from);
        let id = message.get("id").cloned().filter(|id| !id.is_null());

        match (id, method) {
            (Some(id), Some(method)) => Self::Request { id, method },
            (None, Some(method)) => Self::Notification(Notification {
                method,
                params: message.get_mut("params").map(Value::take),
            }),
            (Some(id), None) => {
                let Some(id) = id.as_u64() else {
                    return Self::Unknown(message);
                };
                let error = message.get("error").filter(|e| !e.is_null()).cloned();
                let outcome = match error {
                    Some(error) => Err(RpcError::Remote {
                        code: error.get("code").and_then(|c| c.as_i64()).unwrap_or(-1),
                        message: error
                            .get("message")
                            .and_then(|m| m.as_str())
                            .unwrap_or("Unknown error")
                            .to_string(),
                        data: error.get("data").cloned(),
                    }),
                    None => Ok(message.get_mut("result").map(Value::take).unwrap_or(Value::Null)),
                };
                Self::Response { id, outcome }
            }
            (None, None) => Self::Unknown(message),
        }
    }
}

/// Build a request message.
pub(crate) fn request_message(id: u64, method: &str, params: Option<Value>) -> Value {
    let mut message = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
    });
    if let Some(params) = params {
        message["params"] = params;
    }
    message
}

/// Build a notification message.
pub(crate) fn notification_message(method: &str, params: Option<Value>) -> Value {
    let mut message = json!({
        "jsonrpc": "2.0",
        "method": method,
    });
    if let Some(params) = params {
        message["params"] = params;
    }
    message
}

/// Build an error response to a server-initiated request.
pub(crate) fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_result_response() {
        let incoming = Incoming::classify(json!({"jsonrpc": "2.0", "id": 1, "result": "pong"}));
        match incoming {
            Incoming::Response { id, outcome } => {
                assert_eq!(id, 1);
                assert_eq!(outcome.unwrap(), json!("pong"));
            }
            other => panic!("Expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_null_result_is_success() {
        match Incoming::classify(json!({"id": 4, "result": null})) {
            Incoming::Response { outcome, .. } => assert_eq!(outcome.unwrap(), Value::Null),
            other => panic!("Expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_error_response() {
        let incoming =
            Incoming::classify(json!({"id": 2, "error": {"code": -32603, "message": "bad"}}));
        match incoming {
            Incoming::Response { id, outcome } => {
                assert_eq!(id, 2);
                let err = outcome.unwrap_err();
                assert_eq!(err.code(), Some(-32603));
                assert!(err.to_string().contains("bad"));
            }
            other => panic!("Expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_notification_and_request() {
        match Incoming::classify(json!({"method": "progress", "params": {"pct": 50}})) {
            Incoming::Notification(n) => {
                assert_eq!(n.method, "progress");
                assert_eq!(n.params, Some(json!({"pct": 50})));
            }
            other => panic!("Expected notification, got {other:?}"),
        }

        assert!(matches!(
            Incoming::classify(json!({"id": "abc", "method": "sampling/create"})),
            Incoming::Request { .. }
        ));
        assert!(matches!(
            Incoming::classify(json!({"id": "abc", "result": 1})),
            Incoming::Unknown(_)
        ));
        assert!(matches!(Incoming::classify(json!([1, 2])), Incoming::Unknown(_)));
    }

    #[test]
    fn test_request_message_shape() {
        let message = request_message(7, "ping", None);
        assert_eq!(message, json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}));

        let message = notification_message("log", Some(json!({"level": "info"})));
        assert_eq!(message["params"]["level"], "info");
        assert!(message.get("id").is_none());
    }

    #[test]
    fn test_config_defaults() {
        let config: RpcConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RpcConfig::default());
        assert_eq!(config.default_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
        assert_eq!(RpcConfig::new("mcp").with_timeout_ms(5).default_timeout_ms, 5);
    }
}
