//! ResponseHandler - Handles text frames sent by the daemon
//!
//! Keepalive pings are answered directly; everything else goes to the session
//! to resolve the matching pending call.

use http_relay_common::constants::PONG_FRAME;
use http_relay_common::is_ping;
use tokio::sync::mpsc::WeakSender;
use tracing::debug;

use crate::session::{ConnectionId, Outbound, Session};

/// Handler for one text frame from a tunnel connection
pub async fn handle_response(
    session: &Session,
    connection_id: ConnectionId,
    frame: &str,
    pong_tx: &WeakSender<Outbound>,
) {
    if is_ping(frame) {
        // Heartbeat, answered without touching the session
        if let Some(tx) = pong_tx.upgrade() {
            let _ = tx.send(Outbound::Frame(PONG_FRAME.to_string())).await;
        }
        debug!(connection_id, "Answered ping from daemon");
        return;
    }

    session.on_message(connection_id, frame);
}
