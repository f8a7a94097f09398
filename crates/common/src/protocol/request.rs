use serde::{Deserialize, Serialize};

use super::HeaderList;
use crate::error::{Result, TunnelError};

/// An HTTP request forwarded from the gateway to the daemon over the tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Call identifier; the daemon echoes it back in the response
    pub id: String,

    /// HTTP method (GET, POST, PUT, DELETE, etc.)
    pub method: String,

    /// Request path including the query string
    /// Example: "/api/v1/users?limit=10"
    pub path: String,

    /// Request headers in arrival order
    #[serde(default)]
    pub headers: HeaderList,

    /// UTF-8 body, `None` for methods that carry no payload
    #[serde(default)]
    pub body: Option<String>,
}

impl RequestEnvelope {
    /// Create a request envelope without headers or body
    pub fn new(id: impl Into<String>, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            path: path.into(),
            headers: HeaderList::new(),
            body: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderList) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Option<String>) -> Self {
        self.body = body;
        self
    }

    /// Encode as a JSON text frame
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a JSON text frame
    pub fn from_frame(frame: &str) -> Result<Self> {
        serde_json::from_str(frame)
            .map_err(|e| TunnelError::InvalidMessage(format!("Invalid request frame: {}", e)))
    }
}

/// Whether requests with this method carry a body over the tunnel
pub fn method_has_payload(method: &str) -> bool {
    !matches!(
        method.to_ascii_uppercase().as_str(),
        "GET" | "HEAD" | "DELETE"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_envelope_creation() {
        let req = RequestEnvelope::new("call_123", "GET", "/api/users");

        assert_eq!(req.id, "call_123");
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/api/users");
        assert!(req.headers.is_empty());
        assert!(req.body.is_none());
    }

    #[test]
    fn test_get_serializes_null_body() {
        let req = RequestEnvelope::new("call_1", "GET", "/hello");
        let frame = req.to_frame().unwrap();

        assert!(frame.contains(r#""body":null"#));
        assert!(frame.contains(r#""headers":{}"#));
        assert!(frame.contains(r#""path":"/hello""#));
    }

    #[test]
    fn test_post_frame_fields() {
        let mut headers = HeaderList::new();
        headers.push("content-type", "text/plain");
        let req = RequestEnvelope::new("call_2", "POST", "/echo?x=1")
            .with_headers(headers)
            .with_body(Some("Echo time...".to_string()));

        let frame = req.to_frame().unwrap();
        assert!(frame.contains(r#""headers":{"content-type":"text/plain"}"#));
        assert!(frame.contains(r#""body":"Echo time...""#));

        let parsed = RequestEnvelope::from_frame(&frame).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn test_decode_external_frame() {
        let frame = r#"{
            "id": "3f1c",
            "method": "PUT",
            "path": "/items/1",
            "headers": {"accept": "application/json"},
            "body": "{}"
        }"#;

        let parsed = RequestEnvelope::from_frame(frame).unwrap();
        assert_eq!(parsed.method, "PUT");
        assert_eq!(parsed.headers.get("accept"), Some("application/json"));
        assert_eq!(parsed.body.as_deref(), Some("{}"));
    }

    #[test]
    fn test_decode_malformed_frame() {
        let err = RequestEnvelope::from_frame("ping").unwrap_err();
        assert!(matches!(err, TunnelError::InvalidMessage(_)));

        let err = RequestEnvelope::from_frame(r#"{"id":"x"}"#).unwrap_err();
        assert!(matches!(err, TunnelError::InvalidMessage(_)));
    }

    #[test]
    fn test_method_has_payload() {
        assert!(!method_has_payload("GET"));
        assert!(!method_has_payload("head"));
        assert!(!method_has_payload("DELETE"));
        assert!(method_has_payload("POST"));
        assert!(method_has_payload("PUT"));
        assert!(method_has_payload("PATCH"));
    }
}
