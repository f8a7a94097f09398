//! RegisterHandler - Exchanges a session credential for a daemon credential

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::AppState;
use crate::auth::{AuthError, TokenKind, authenticate};

/// Body returned by the register endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    /// Subject the daemon credential acts for
    pub user_id: String,
    /// Machine credential to present on the tunnel path
    pub daemon_token: String,
    /// Expiry as seconds since the Unix epoch
    pub expires_at: i64,
}

/// Handler for daemon registration
pub async fn handle_register(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match register(&state, &headers) {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            warn!("Daemon registration rejected: {}", e);
            (StatusCode::UNAUTHORIZED, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

fn register(state: &AppState, headers: &HeaderMap) -> Result<RegisterResponse, AuthError> {
    let (_, subject) = authenticate(state.identity.as_ref(), headers, &[TokenKind::Session])?;

    let issued = state
        .identity
        .mint_machine_token(&subject, state.config.machine_token_ttl)?;

    info!(subject = %subject, expires_at = %issued.expires_at, "Issued daemon credential");

    Ok(RegisterResponse {
        user_id: subject.to_string(),
        daemon_token: issued.token,
        expires_at: issued.expires_at.timestamp(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_response_shape() {
        let body = RegisterResponse {
            user_id: "user_1".to_string(),
            daemon_token: "token".to_string(),
            expires_at: 1_700_000_000,
        };
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(
            value,
            json!({"userId": "user_1", "daemonToken": "token", "expiresAt": 1_700_000_000})
        );
    }
}
