//! JSON-RPC 2.0 framing for the MCP endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const JSONRPC_VERSION: &str = "2.0";

pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    /// No valid credential was presented
    pub const UNAUTHORIZED: i32 = -32001;
    /// The credential lacks a scope the operation requires
    pub const INSUFFICIENT_SCOPE: i32 = -32003;
}

pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";
    pub const INITIALIZED: &str = "notifications/initialized";
}

/// A request or notification; notifications carry no `id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self::new(error_codes::PARSE_ERROR, format!("Parse error: {detail}"))
    }

    pub fn invalid_request(detail: impl std::fmt::Display) -> Self {
        Self::new(
            error_codes::INVALID_REQUEST,
            format!("Invalid Request: {detail}"),
        )
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )
    }

    pub fn invalid_params(detail: impl std::fmt::Display) -> Self {
        Self::new(error_codes::INVALID_PARAMS, format!("Invalid params: {detail}"))
    }

    pub fn unauthorized(detail: impl std::fmt::Display) -> Self {
        Self::new(error_codes::UNAUTHORIZED, format!("Unauthorized: {detail}"))
    }

    pub fn insufficient_scope(required: &[String], granted: &[String]) -> Self {
        Self::new(error_codes::INSUFFICIENT_SCOPE, "Insufficient scope").with_data(json!({
            "required_scopes": required,
            "granted_scopes": granted,
        }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Error response; an unknown id is reported as `null`
    pub fn error(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(error),
        }
    }
}

/// One element of an incoming payload
#[derive(Debug)]
pub enum IncomingMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcRequest),
    /// A client reply to a server-initiated request
    Response,
    Invalid {
        id: Option<Value>,
        error: JsonRpcError,
    },
}

impl IncomingMessage {
    pub fn classify(value: Value) -> Self {
        let Value::Object(object) = value else {
            return IncomingMessage::Invalid {
                id: None,
                error: JsonRpcError::invalid_request("message must be an object"),
            };
        };

        let id = object.get("id").filter(|id| is_valid_id(id)).cloned();
        if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return IncomingMessage::Invalid {
                id,
                error: JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
            };
        }

        if !object.contains_key("method") {
            if object.contains_key("result") || object.contains_key("error") {
                return IncomingMessage::Response;
            }
            return IncomingMessage::Invalid {
                id,
                error: JsonRpcError::invalid_request("missing method"),
            };
        }

        if object.get("id").is_some_and(|id| !is_valid_id(id)) {
            return IncomingMessage::Invalid {
                id: None,
                error: JsonRpcError::invalid_request("id must be a string or number"),
            };
        }

        match serde_json::from_value::<JsonRpcRequest>(Value::Object(object)) {
            Ok(request) if request.id.is_some() => IncomingMessage::Request(request),
            Ok(notification) => IncomingMessage::Notification(notification),
            Err(e) => IncomingMessage::Invalid {
                id,
                error: JsonRpcError::invalid_request(e),
            },
        }
    }
}

fn is_valid_id(id: &Value) -> bool {
    matches!(id, Value::String(_) | Value::Number(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_request_and_notification() {
        let request = IncomingMessage::classify(json!({
            "jsonrpc": "2.0", "id": 1, "method": "ping"
        }));
        assert!(matches!(request, IncomingMessage::Request(r) if r.method == "ping"));

        let notification = IncomingMessage::classify(json!({
            "jsonrpc": "2.0", "method": "notifications/initialized"
        }));
        assert!(matches!(notification, IncomingMessage::Notification(_)));
    }

    #[test]
    fn test_classify_response_and_invalid() {
        assert!(matches!(
            IncomingMessage::classify(json!({ "jsonrpc": "2.0", "id": 1, "result": {} })),
            IncomingMessage::Response
        ));
        assert!(matches!(
            IncomingMessage::classify(json!([1])),
            IncomingMessage::Invalid { id: None, .. }
        ));
        assert!(matches!(
            IncomingMessage::classify(json!({ "jsonrpc": "1.0", "id": 4, "method": "ping" })),
            IncomingMessage::Invalid { id: Some(_), .. }
        ));
        assert!(matches!(
            IncomingMessage::classify(json!({ "jsonrpc": "2.0", "id": {}, "method": "ping" })),
            IncomingMessage::Invalid { id: None, .. }
        ));
        assert!(matches!(
            IncomingMessage::classify(json!({ "jsonrpc": "2.0", "id": 2, "method": 5 })),
            IncomingMessage::Invalid { id: Some(_), .. }
        ));
    }

    #[test]
    fn test_error_response_serialization() {
        let response = JsonRpcResponse::error(
            Some(json!(3)),
            JsonRpcError::insufficient_scope(&["git:read".to_string()], &[]),
        );
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "error": {
                    "code": -32003,
                    "message": "Insufficient scope",
                    "data": { "required_scopes": ["git:read"], "granted_scopes": [] }
                }
            })
        );
    }

    #[test]
    fn test_unknown_id_serializes_as_null() {
        let response = JsonRpcResponse::error(None, JsonRpcError::parse_error("eof"));
        let value = serde_json::to_value(response).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], -32700);
        assert!(value.get("result").is_none());
    }
}
