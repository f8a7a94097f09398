//! DisconnectHandler - Handles the end of a tunnel connection

use tracing::info;

use crate::session::{ConnectionId, Session};

/// Handler for a closed tunnel connection
///
/// Detaches the session if this connection is still the active one; a
/// connection that was already replaced leaves the session untouched.
pub fn handle_disconnect(session: &Session, connection_id: ConnectionId) {
    let was_active = session.active_connection() == Some(connection_id);
    session.on_close(connection_id);

    if was_active {
        info!(subject = %session.subject(), connection_id, "Daemon disconnected");
    } else {
        info!(subject = %session.subject(), connection_id, "Superseded connection finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Subject;
    use crate::session::SessionConfig;
    use tokio::sync::mpsc;

    #[test]
    fn test_disconnect_detaches_active_connection() {
        let session = Session::new(Subject::for_test("user_1"), SessionConfig::default());
        let (tx, _rx) = mpsc::channel(8);
        let conn = session.attach(tx);

        handle_disconnect(&session, conn);
        assert!(!session.is_attached());
    }

    #[test]
    fn test_disconnect_of_superseded_connection_is_ignored() {
        let session = Session::new(Subject::for_test("user_1"), SessionConfig::default());
        let (old_tx, _old_rx) = mpsc::channel(8);
        let old = session.attach(old_tx);
        let (new_tx, _new_rx) = mpsc::channel(8);
        let new = session.attach(new_tx);

        handle_disconnect(&session, old);
        assert_eq!(session.active_connection(), Some(new));
    }
}
