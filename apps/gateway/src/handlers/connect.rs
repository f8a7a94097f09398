//! ConnectHandler - Handles daemon tunnel attach
//!
//! Upgrades an authenticated request on the tunnel path to a WebSocket,
//! attaches it to the subject's session and pumps frames until it closes.
//! Daemons ping on an interval, so a tunnel that goes silent is detached.

use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use http_relay_common::constants::TUNNEL_OUTBOUND_BUFFER;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, info_span, warn};

use super::disconnect::handle_disconnect;
use super::response::handle_response;
use crate::AppState;
use crate::auth::{TokenKind, authenticate};
use crate::error_handling::tunnel_error_response;
use crate::session::{Outbound, Session};

/// Body of the 426 answer to a non-upgrade request on the tunnel path
pub const EXPECTED_WS_UPGRADE: &str = "Expected WebSocket upgrade header";

/// Handler for the tunnel attach path
pub async fn handle_connect(
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!("Rejecting tunnel request without upgrade: {}", rejection);
            return (StatusCode::UPGRADE_REQUIRED, EXPECTED_WS_UPGRADE).into_response();
        }
    };

    let subject = match authenticate(state.identity.as_ref(), &headers, &[TokenKind::Machine]) {
        Ok((_, subject)) => subject,
        Err(e) => {
            warn!("Tunnel authentication failed: {}", e);
            return e.into_response();
        }
    };

    let session = match state.registry.get(&subject) {
        Ok(session) => session,
        Err(e) => return tunnel_error_response(&e),
    };

    info!(subject = %subject, "Daemon connecting...");

    let idle_timeout = state.config.tunnel_idle_timeout;
    ws.on_upgrade(move |socket| {
        run_tunnel(socket, session, idle_timeout)
            .instrument(info_span!("tunnel", subject = %subject))
    })
}

/// Pump one attached tunnel until it closes, is replaced or stays silent for
/// `idle_timeout`
async fn run_tunnel(socket: WebSocket, session: Arc<Session>, idle_timeout: Duration) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Outbound>(TUNNEL_OUTBOUND_BUFFER);

    // The session holds the only strong sender, so dropping its handle stops the pump
    let pong_tx = outgoing_tx.downgrade();
    let connection_id = session.attach(outgoing_tx);

    // Forward queued frames to the WS sink
    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = outgoing_rx.recv().await {
            match outbound {
                Outbound::Frame(text) => {
                    if ws_sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let _ = ws_sink
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
        let _ = ws_sink.close().await;
    });

    // Process frames from the daemon
    loop {
        let message = tokio::select! {
            message = tokio::time::timeout(idle_timeout, ws_stream.next()) => match message {
                Ok(message) => message,
                Err(_) => {
                    warn!(connection_id, "No frames from daemon for {:?}, dropping tunnel", idle_timeout);
                    break;
                }
            },
            _ = &mut send_task => {
                debug!(connection_id, "Send task finished");
                break;
            }
        };

        match message {
            Some(Ok(Message::Text(text))) => {
                handle_response(&session, connection_id, text.as_str(), &pong_tx).await;
            }
            Some(Ok(Message::Binary(_))) => {
                warn!(connection_id, "Received unexpected binary message");
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(connection_id, "Daemon closed connection: {:?}", frame);
                break;
            }
            // Transport pings are answered by the WebSocket layer
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Err(e)) => {
                warn!(connection_id, "WebSocket error: {}", e);
                break;
            }
            None => break,
        }
    }

    handle_disconnect(&session, connection_id);
    send_task.abort();
}
