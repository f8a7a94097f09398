use serde::{Deserialize, Serialize};

use super::HeaderList;
use crate::error::{Result, TunnelError};

/// The response from the local service, sent back through the tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Must match the id of the corresponding RequestEnvelope
    pub id: String,

    /// HTTP status code (200, 404, 500, etc.)
    pub status: u16,

    /// Response headers in the order the local service sent them
    #[serde(default)]
    pub headers: HeaderList,

    /// UTF-8 response body
    #[serde(default)]
    pub body: String,
}

impl ResponseEnvelope {
    /// Create a response envelope without headers or body
    pub fn new(id: impl Into<String>, status: u16) -> Self {
        Self {
            id: id.into(),
            status,
            headers: HeaderList::new(),
            body: String::new(),
        }
    }

    /// A plain-text response the daemon synthesizes when it cannot reach the local service
    pub fn synthetic(id: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        let mut headers = HeaderList::new();
        headers.push("content-type", "text/plain; charset=utf-8");
        Self {
            id: id.into(),
            status,
            headers,
            body: message.into(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderList) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Encode as a JSON text frame
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a JSON text frame
    pub fn from_frame(frame: &str) -> Result<Self> {
        serde_json::from_str(frame)
            .map_err(|e| TunnelError::InvalidMessage(format!("Invalid response frame: {}", e)))
    }
}
