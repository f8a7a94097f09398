use thiserror::Error;

/// Error types for the HTTP relay system
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Tunnel not connected")]
    NotConnected,

    #[error("Timeout waiting for response")]
    Timeout,

    #[error("Tunnel replaced by a newer connection")]
    Replaced,

    #[error("Tunnel disconnected")]
    Disconnected,

    #[error("Session capacity exceeded")]
    CapacityExceeded,

    #[error("Local delivery failed: {0}")]
    LocalDeliveryFailed(String),

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl TunnelError {
    /// Whether the error means the tunnel went away while a call was in flight
    pub fn is_tunnel_lost(&self) -> bool {
        matches!(self, TunnelError::Replaced | TunnelError::Disconnected)
    }
}

/// Type alias for Results using TunnelError
pub type Result<T> = std::result::Result<T, TunnelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TunnelError::InvalidMessage("test".to_string());
        assert_eq!(err.to_string(), "Invalid message format: test");

        let err = TunnelError::Timeout;
        assert_eq!(err.to_string(), "Timeout waiting for response");

        let err = TunnelError::NotConnected;
        assert_eq!(err.to_string(), "Tunnel not connected");
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json");
        assert!(json_err.is_err());

        let tunnel_err: TunnelError = json_err.unwrap_err().into();
        assert!(matches!(tunnel_err, TunnelError::SerializationError(_)));
    }

    #[test]
    fn test_tunnel_lost() {
        assert!(TunnelError::Replaced.is_tunnel_lost());
        assert!(TunnelError::Disconnected.is_tunnel_lost());
        assert!(!TunnelError::NotConnected.is_tunnel_lost());
        assert!(!TunnelError::Timeout.is_tunnel_lost());
    }
}
