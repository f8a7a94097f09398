//! ForwardingHandler - Handles public HTTP requests
//!
//! Authenticates the caller, forwards the request over the tunnel of the
//! caller's session and relays the daemon's response. Requests that get no
//! response within the timeout are answered with 504 Gateway Timeout.

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use http_relay_common::{header_list_from_map, is_hop_by_hop, method_has_payload};
use tracing::{debug, warn};

use crate::auth::{TokenKind, authenticate};
use crate::build_http_response;
use crate::error_handling::tunnel_error_response;
use crate::session::ProxyRequest;
use crate::AppState;

/// Handler for every request that is not a tunnel attach or registration
pub async fn handle_forwarding(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let subject = match authenticate(
        state.identity.as_ref(),
        &headers,
        &[TokenKind::Session, TokenKind::Machine],
    ) {
        Ok((_, subject)) => subject,
        Err(e) => {
            debug!("Rejecting {} {}: {}", method, uri, e);
            return e.into_response();
        }
    };

    // Oversized bodies are rejected with 413 by the extractor
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return rejection.into_response(),
    };

    let request = match build_proxy_request(&method, &uri, &headers, body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let session = match state.registry.get(&subject) {
        Ok(session) => session,
        Err(e) => return tunnel_error_response(&e),
    };

    debug!(subject = %subject, "Forwarding {} {}", request.method, request.path);

    match session.forward(request).await {
        Ok(response) => {
            debug!(subject = %subject, status = response.status, "Relaying tunnel response");
            build_http_response(response)
        }
        Err(e) => {
            if e.is_tunnel_lost() {
                warn!(subject = %subject, "Tunnel lost during call: {}", e);
            }
            tunnel_error_response(&e)
        }
    }
}

/// Build the tunnelled request from the inbound HTTP request
///
/// Hop-by-hop headers are dropped. Methods without payload never carry a
/// body; other bodies must be valid UTF-8.
pub fn build_proxy_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<ProxyRequest, Response> {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let headers = header_list_from_map(headers)
        .into_iter()
        .filter(|(name, _)| !is_hop_by_hop(name))
        .collect();

    let body = if method_has_payload(method.as_str()) {
        let text = String::from_utf8(body.to_vec()).map_err(|_| {
            (StatusCode::BAD_REQUEST, "Request body must be valid UTF-8").into_response()
        })?;
        Some(text)
    } else {
        None
    };

    Ok(ProxyRequest {
        method: method.to_string(),
        path,
        headers,
        body,
    })
}
