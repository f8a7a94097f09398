//! Edge gateway of the HTTP relay
//!
//! Daemons attach a WebSocket tunnel on [`TUNNEL_PATH`]; every other request
//! is authenticated, routed to the caller's [`Session`] and delivered over
//! that subject's tunnel.

use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, post};
use http_relay_common::constants::{MAX_BODY_SIZE_BYTES, REGISTER_PATH, TUNNEL_PATH};
use http_relay_common::{ResponseEnvelope, header_list_to_map, is_hop_by_hop};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub mod auth;
pub mod config;
pub mod error_handling;
pub mod handlers;
pub mod registry;
pub mod session;

pub use auth::{AuthError, IdentityProvider, JwtIdentityProvider, Subject, TokenKind};
pub use config::Config;
pub use registry::SessionRegistry;
pub use session::{Session, SessionConfig};

/// State shared across all gateway handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub identity: Arc<dyn IdentityProvider>,
    pub config: Arc<Config>,
}

impl AppState {
    /// State backed by the HS256 identity provider from `config`
    pub fn new(config: Config) -> Self {
        let identity = Arc::new(JwtIdentityProvider::new(&config.jwt_secret));
        Self::with_identity(config, identity)
    }

    pub fn with_identity(config: Config, identity: Arc<dyn IdentityProvider>) -> Self {
        let registry = SessionRegistry::new(
            SessionConfig {
                forward_timeout: config.request_timeout,
            },
            config.max_sessions,
            config.session_idle_timeout,
        );

        Self {
            registry: Arc::new(registry),
            identity,
            config: Arc::new(config),
        }
    }
}

/// Build the gateway router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.cors_origin.as_deref());

    Router::new()
        .route(TUNNEL_PATH, any(handlers::handle_connect))
        .route(
            REGISTER_PATH,
            post(handlers::handle_register).fallback(handlers::handle_forwarding),
        )
        .fallback(handlers::handle_forwarding)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy: any origin unless one is configured
fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let allow_origin = match origin {
        None | Some("*") => AllowOrigin::any(),
        Some(origin) => match HeaderValue::from_str(origin) {
            Ok(value) => AllowOrigin::exact(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {:?}: {}", origin, e);
                AllowOrigin::list(Vec::<HeaderValue>::new())
            }
        },
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
}

/// Convert a tunnelled response into the HTTP response for the caller
pub fn build_http_response(response: ResponseEnvelope) -> Response {
    let Ok(status) = StatusCode::from_u16(response.status) else {
        warn!(call_id = %response.id, status = response.status, "Daemon returned invalid status");
        return (StatusCode::BAD_GATEWAY, "Invalid tunnel response").into_response();
    };

    let mut headers = header_list_to_map(&response.headers);
    let hop_by_hop: Vec<_> = headers
        .keys()
        .filter(|name| is_hop_by_hop(name.as_str()))
        .cloned()
        .collect();
    for name in hop_by_hop {
        headers.remove(&name);
    }

    let mut http_response = Response::new(Body::from(response.body));
    *http_response.status_mut() = status;
    *http_response.headers_mut() = headers;
    http_response
}
