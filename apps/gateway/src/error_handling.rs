//! Error handling and sanitization
//!
//! Maps tunnel failures to HTTP responses. Callers get a short fixed message;
//! anything unexpected is logged in full and answered with a generic 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use http_relay_common::TunnelError;
use tracing::{debug, error};

/// Status and client-facing message for a tunnel error
///
/// # Examples
///
/// ```
/// use axum::http::StatusCode;
/// use http_relay_common::TunnelError;
/// use http_relay_gateway::error_handling::client_error;
///
/// assert_eq!(
///     client_error(&TunnelError::NotConnected),
///     (StatusCode::BAD_GATEWAY, "Tunnel not connected")
/// );
/// ```
pub fn client_error(e: &TunnelError) -> (StatusCode, &'static str) {
    match e {
        TunnelError::NotConnected => (StatusCode::BAD_GATEWAY, "Tunnel not connected"),
        TunnelError::Replaced | TunnelError::Disconnected => {
            (StatusCode::BAD_GATEWAY, "Tunnel disconnected")
        }
        TunnelError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "Tunnel timeout"),
        TunnelError::CapacityExceeded => (StatusCode::SERVICE_UNAVAILABLE, "Too many sessions"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
    }
}

/// Whether the error is an expected outcome rather than a gateway fault
pub fn is_safe_error(e: &TunnelError) -> bool {
    e.is_tunnel_lost()
        || matches!(
            e,
            TunnelError::NotConnected | TunnelError::Timeout | TunnelError::CapacityExceeded
        )
}

/// Build the response for a failed tunnel call
pub fn tunnel_error_response(e: &TunnelError) -> Response {
    if is_safe_error(e) {
        debug!("Tunnel call failed: {}", e);
    } else {
        // Log full error internally
        error!("Internal error: {}", e);
    }

    client_error(e).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tunnel_status_mapping() {
        assert_eq!(client_error(&TunnelError::NotConnected).0, StatusCode::BAD_GATEWAY);
        assert_eq!(client_error(&TunnelError::Replaced).0, StatusCode::BAD_GATEWAY);
        assert_eq!(client_error(&TunnelError::Disconnected).0, StatusCode::BAD_GATEWAY);
        assert_eq!(client_error(&TunnelError::Timeout), (StatusCode::GATEWAY_TIMEOUT, "Tunnel timeout"));
        assert_eq!(
            client_error(&TunnelError::CapacityExceeded).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_internal_errors_are_sanitized() {
        let err = TunnelError::InternalError("duplicate call id 1234".to_string());
        let (status, message) = client_error(&err);

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Internal server error");
        assert!(!message.contains("1234"));
        assert!(!is_safe_error(&err));
    }

    #[test]
    fn test_safe_errors_are_identified() {
        assert!(is_safe_error(&TunnelError::Timeout));
        assert!(is_safe_error(&TunnelError::Disconnected));
        assert!(!is_safe_error(&TunnelError::WebSocketError("reset".to_string())));
    }

    #[test]
    fn test_error_response_status() {
        let response = tunnel_error_response(&TunnelError::Timeout);
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
