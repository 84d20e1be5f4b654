//! JSON-RPC 2.0 message framing shared by all three transports.

use crate::error::ConnectionError;
use serde::{Deserialize, Deserializer, Serialize};

/// A JSON-RPC 2.0 request. Request ids are locally generated `u64`s.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response.
///
/// Some servers echo numeric ids back as strings; both forms decode to
/// the original `u64` so the dispatch-by-id path works either way.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<u64>,
    pub result: Option<serde_json::Value>,
    pub error: Option<RpcError>,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl Response {
    /// Fold the response into the payload or a typed error: a server
    /// error object becomes [`ConnectionError::Rpc`], and a response
    /// carrying neither result nor error is a protocol violation.
    pub fn into_result(self) -> Result<serde_json::Value, ConnectionError> {
        if let Some(err) = self.error {
            return Err(ConnectionError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        self.result.ok_or_else(|| {
            ConnectionError::Protocol("response has neither result nor error".to_string())
        })
    }
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Num(u64),
        Str(String),
    }

    Ok(match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Num(n)) => Some(n),
        Some(RawId::Str(s)) => s.parse().ok(),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_request_with_params() {
        let req = Request::new(
            1,
            "tools/call",
            Some(serde_json::json!({"name": "add", "arguments": {"a": 2}})),
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 1);
        assert_eq!(json["method"], "tools/call");
        assert_eq!(json["params"]["name"], "add");
    }

    #[test]
    fn serialize_request_omits_absent_params() {
        let req = Request::new(7, "tools/list", None);
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("params").is_none());
    }

    #[test]
    fn serialize_notification_has_no_id() {
        let notif = Notification::new("notifications/initialized", None);
        let json = serde_json::to_value(&notif).unwrap();
        assert_eq!(json["method"], "notifications/initialized");
        assert!(json.get("id").is_none());
    }

    #[test]
    fn deserialize_response_with_result() {
        let json = r#"{"jsonrpc":"2.0","id":3,"result":{"tools":[]}}"#;
        let resp: Response = serde_json::from_str(json).unwrap();
        assert_eq!(resp.id, Some(3));
        let value = resp.into_result().unwrap();
        assert!(value["tools"].is_array());
    }

    #[test]
    fn deserialize_response_with_string_id() {
        let json = r#"{"jsonrpc":"2.0","id":"12","result":{}}"#;
        let resp: Response = serde_json::from_str(json).unwrap();
        assert_eq!(resp.id, Some(12));
    }

    #[test]
    fn error_response_folds_into_rpc_error() {
        let json = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#;
        let resp: Response = serde_json::from_str(json).unwrap();
        match resp.into_result() {
            Err(ConnectionError::Rpc { code, message }) => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("expected Rpc error, got {other:?}"),
        }
    }

    #[test]
    fn empty_response_is_a_protocol_error() {
        let json = r#"{"jsonrpc":"2.0","id":1}"#;
        let resp: Response = serde_json::from_str(json).unwrap();
        assert!(matches!(
            resp.into_result(),
            Err(ConnectionError::Protocol(_))
        ));
    }
}
