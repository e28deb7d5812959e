//! IPC protocol definitions.
//!
//! Uses a JSON-RPC-like protocol over Unix domain sockets.

use serde::{Deserialize, Serialize};

/// IPC method types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    // Health
    Health,
    Shutdown,

    // Bridge state
    #[serde(rename = "bridge.status")]
    BridgeStatus,
    #[serde(rename = "bridge.servers")]
    BridgeServers,

    // Session control
    #[serde(rename = "session.connect")]
    SessionConnect,
    #[serde(rename = "session.disconnect")]
    SessionDisconnect,

    // Switch operations
    #[serde(rename = "switch.read")]
    SwitchRead,
    #[serde(rename = "switch.write")]
    SwitchWrite,

    // Load operations
    #[serde(rename = "load.set")]
    LoadSet,
    #[serde(rename = "load.read")]
    LoadRead,

    // Raw pass-through
    #[serde(rename = "raw.send")]
    RawSend,

    // Receive ring
    #[serde(rename = "recv.dump")]
    RecvDump,
    #[serde(rename = "recv.reset")]
    RecvReset,

    // Whitelist
    #[serde(rename = "whitelist.show")]
    WhitelistShow,
    #[serde(rename = "whitelist.reload")]
    WhitelistReload,
}

/// IPC request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation.
    pub id: String,
    /// Method to invoke.
    pub method: Method,
    /// Method parameters (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    /// Create a new request with auto-generated ID.
    pub fn new(method: Method) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method,
            params: None,
        }
    }

    /// Create a new request with parameters.
    pub fn with_params(method: Method, params: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method,
            params: Some(params),
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// IPC response message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request ID for correlation.
    pub id: String,
    /// Result data (if successful).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error information (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Error information in a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code.
    pub code: i32,
    /// Error message.
    pub message: String,
    /// Additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Response {
    /// Create a successful response.
    pub fn success(id: &str, result: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: &str, code: i32, message: &str) -> Self {
        Self {
            id: id.to_string(),
            result: None,
            error: Some(ErrorInfo {
                code,
                message: message.to_string(),
                data: None,
            }),
        }
    }

    /// Create an error response with additional data.
    pub fn error_with_data(id: &str, code: i32, message: &str, data: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            result: None,
            error: Some(ErrorInfo {
                code,
                message: message.to_string(),
                data: Some(data),
            }),
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// Standard error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const NOT_CONNECTED: i32 = -32001;
    pub const SATURATED: i32 = -32002;
    pub const TIMEOUT: i32 = -32003;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = Request::new(Method::Health);
        let json = request.to_json().unwrap();

        assert!(json.contains("\"method\":\"health\""));
        assert!(json.contains("\"id\":"));
    }

    #[test]
    fn test_request_with_params() {
        let request = Request::with_params(
            Method::SwitchRead,
            serde_json::json!({ "master": 2, "station": 20, "button": 7 }),
        );
        let json = request.to_json().unwrap();

        assert!(json.contains("\"method\":\"switch.read\""));
        assert!(json.contains("\"station\":20"));
    }

    #[test]
    fn test_response_success() {
        let response = Response::success("123", serde_json::json!({ "value": 1 }));
        let json = response.to_json().unwrap();

        assert!(json.contains("\"id\":\"123\""));
        assert!(json.contains("\"value\":1"));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_response_error() {
        let response = Response::error("123", error_codes::METHOD_NOT_FOUND, "Unknown method");
        let json = response.to_json().unwrap();

        assert!(json.contains("\"code\":-32601"));
        assert!(json.contains("\"message\":\"Unknown method\""));
        assert!(!json.contains("\"result\""));
    }

    #[test]
    fn test_response_error_with_data() {
        let response = Response::error_with_data(
            "123",
            error_codes::TIMEOUT,
            "no reply within 2000 ms",
            serde_json::json!({ "http_status": 504 }),
        );

        let json = response.to_json().unwrap();
        assert!(json.contains("\"http_status\":504"));
        assert!(!response.is_success());
    }

    #[test]
    fn test_all_methods_serialize() {
        let methods = vec![
            (Method::Health, "health"),
            (Method::Shutdown, "shutdown"),
            (Method::BridgeStatus, "bridge.status"),
            (Method::BridgeServers, "bridge.servers"),
            (Method::SessionConnect, "session.connect"),
            (Method::SessionDisconnect, "session.disconnect"),
            (Method::SwitchRead, "switch.read"),
            (Method::SwitchWrite, "switch.write"),
            (Method::LoadSet, "load.set"),
            (Method::LoadRead, "load.read"),
            (Method::RawSend, "raw.send"),
            (Method::RecvDump, "recv.dump"),
            (Method::RecvReset, "recv.reset"),
            (Method::WhitelistShow, "whitelist.show"),
            (Method::WhitelistReload, "whitelist.reload"),
        ];

        for (method, expected_name) in methods {
            let request = Request::new(method.clone());
            let json = request.to_json().unwrap();
            assert!(
                json.contains(&format!("\"method\":\"{}\"", expected_name)),
                "Method {:?} should serialize to {}",
                method,
                expected_name
            );
        }
    }

    #[test]
    fn test_request_from_json_invalid() {
        assert!(Request::from_json("not json").is_err());
        assert!(Request::from_json(r#"{"id":"123"}"#).is_err());
        assert!(Request::from_json(r#"{"id":"123","method":"bogus.method"}"#).is_err());
    }

    #[test]
    fn test_request_id_uniqueness() {
        let req1 = Request::new(Method::Health);
        let req2 = Request::new(Method::Health);
        assert_ne!(req1.id, req2.id);
    }

    #[test]
    fn test_response_roundtrip() {
        let response = Response::success("test-id", serde_json::json!({"key": "value"}));
        let json = response.to_json().unwrap();

        let parsed = Response::from_json(&json).unwrap();
        assert_eq!(parsed.id, "test-id");
        assert!(parsed.is_success());
        assert!(parsed.result.is_some());
    }
}
