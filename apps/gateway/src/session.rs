//! Per-subject session
//!
//! A session owns at most one attached tunnel and the table of calls that are
//! waiting for a response over it. All state sits behind one lock that is
//! never held across an `.await`; frames are queued for the socket pump after
//! the lock is released.

use crate::auth::Subject;
use http_relay_common::{
    HeaderList, PendingCalls, RequestEnvelope, ResponseEnvelope, Result, TunnelError,
    constants::{
        CLOSE_CODE_GOING_AWAY, CLOSE_CODE_NORMAL, CLOSE_REASON_REPLACED, CLOSE_REASON_SHUTDOWN,
        REQUEST_TIMEOUT_SECS,
    },
    generate_call_id,
    validation::validate_call_id,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Identifies one accepted tunnel connection within a session
pub type ConnectionId = u64;

/// Work queued for a tunnel's socket pump
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Text frame to send as-is
    Frame(String),
    /// Close the socket and stop the pump
    Close { code: u16, reason: String },
}

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long `forward` waits for the correlated response
    pub forward_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            forward_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

/// An HTTP request to deliver over the tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    pub method: String,
    pub path: String,
    pub headers: HeaderList,
    pub body: Option<String>,
}

#[derive(Debug)]
struct TunnelHandle {
    connection_id: ConnectionId,
    outgoing: mpsc::Sender<Outbound>,
    attached_at: Instant,
}

impl TunnelHandle {
    fn close(&self, code: u16, reason: &str) {
        // If the queue is full the pump still stops once this handle is dropped
        if let Err(e) = self.outgoing.try_send(Outbound::Close {
            code,
            reason: reason.to_string(),
        }) {
            debug!(
                connection_id = self.connection_id,
                "Could not queue close frame: {}", e
            );
        }
    }
}

#[derive(Debug)]
struct SessionState {
    tunnel: Option<TunnelHandle>,
    pending: PendingCalls,
    last_active: Instant,
}

/// Tunnel state and in-flight calls of one subject
#[derive(Debug)]
pub struct Session {
    subject: Subject,
    config: SessionConfig,
    next_connection_id: AtomicU64,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(subject: Subject, config: SessionConfig) -> Self {
        Self {
            subject,
            config,
            next_connection_id: AtomicU64::new(1),
            state: Mutex::new(SessionState {
                tunnel: None,
                pending: PendingCalls::new(),
                last_active: Instant::now(),
            }),
        }
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // The state stays consistent across a panicking holder: every mutation is a single step
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a new tunnel, replacing any attached one
    ///
    /// A replaced tunnel is told to close with reason `replaced`, and calls
    /// that were waiting on it fail with [`TunnelError::Replaced`].
    pub fn attach(&self, outgoing: mpsc::Sender<Outbound>) -> ConnectionId {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let handle = TunnelHandle {
            connection_id,
            outgoing,
            attached_at: Instant::now(),
        };

        let (replaced, failed) = {
            let mut state = self.lock();
            let replaced = state.tunnel.replace(handle);
            let failed = if replaced.is_some() {
                state.pending.fail_all(|| TunnelError::Replaced)
            } else {
                0
            };
            state.last_active = Instant::now();
            (replaced, failed)
        };

        if let Some(old) = replaced {
            warn!(
                subject = %self.subject,
                connection_id,
                replaced = old.connection_id,
                failed,
                "Tunnel replaced by a newer connection"
            );
            old.close(CLOSE_CODE_NORMAL, CLOSE_REASON_REPLACED);
        } else {
            info!(subject = %self.subject, connection_id, "Tunnel attached");
        }

        connection_id
    }

    /// Deliver a request over the attached tunnel and wait for its response
    ///
    /// Fails with `NotConnected` when no tunnel is attached, `Timeout` when no
    /// response arrives in time, and `Replaced`/`Disconnected` when the tunnel
    /// goes away first. Dropping the returned future withdraws the call.
    pub async fn forward(&self, request: ProxyRequest) -> Result<ResponseEnvelope> {
        let call_id = generate_call_id();
        let envelope = RequestEnvelope::new(call_id.clone(), request.method, request.path)
            .with_headers(request.headers)
            .with_body(request.body);
        let frame = envelope.to_frame()?;

        let (outgoing, receiver) = {
            let mut state = self.lock();
            let Some(tunnel) = state.tunnel.as_ref() else {
                return Err(TunnelError::NotConnected);
            };
            let outgoing = tunnel.outgoing.clone();
            let receiver = state.pending.register(&call_id)?;
            state.last_active = Instant::now();
            (outgoing, receiver)
        };

        let _guard = PendingGuard {
            session: self,
            call_id: &call_id,
        };

        debug!(subject = %self.subject, call_id = %call_id, "{} {}", envelope.method, envelope.path);

        let exchange = async {
            outgoing
                .send(Outbound::Frame(frame))
                .await
                .map_err(|_| TunnelError::Disconnected)?;
            // A dropped responder means the call was withdrawn without an outcome
            receiver.await.map_err(|_| TunnelError::Disconnected)?
        };

        match tokio::time::timeout(self.config.forward_timeout, exchange).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(subject = %self.subject, call_id = %call_id, "Timed out waiting for tunnel response");
                Err(TunnelError::Timeout)
            }
        }
    }

    /// Handle a text frame received on a tunnel connection
    ///
    /// Returns true when the frame resolved a pending call. Malformed frames,
    /// frames from a superseded connection and responses for unknown calls are
    /// dropped.
    pub fn on_message(&self, connection_id: ConnectionId, frame: &str) -> bool {
        let response = match ResponseEnvelope::from_frame(frame) {
            Ok(response) => response,
            Err(e) => {
                warn!(subject = %self.subject, connection_id, "Ignoring frame: {}", e);
                return false;
            }
        };

        if let Err(e) = validate_call_id(&response.id) {
            warn!(subject = %self.subject, connection_id, "Ignoring frame: {}", e);
            return false;
        }

        let call_id = response.id.clone();
        let resolved = {
            let mut state = self.lock();
            if state.tunnel.as_ref().map(|t| t.connection_id) != Some(connection_id) {
                drop(state);
                debug!(
                    subject = %self.subject,
                    connection_id,
                    call_id = %call_id,
                    "Discarding frame from superseded connection"
                );
                return false;
            }
            state.last_active = Instant::now();
            state.pending.resolve(response)
        };

        if resolved {
            debug!(subject = %self.subject, call_id = %call_id, "Call resolved");
        } else {
            debug!(subject = %self.subject, call_id = %call_id, "Discarding response for unknown call");
        }
        resolved
    }

    /// Handle the end of a tunnel connection
    pub fn on_close(&self, connection_id: ConnectionId) {
        let (closed, failed) = {
            let mut state = self.lock();
            if state.tunnel.as_ref().map(|t| t.connection_id) != Some(connection_id) {
                return;
            }
            let closed = state.tunnel.take();
            let failed = state.pending.fail_all(|| TunnelError::Disconnected);
            state.last_active = Instant::now();
            (closed, failed)
        };

        if let Some(tunnel) = closed {
            info!(
                subject = %self.subject,
                connection_id,
                failed,
                "Tunnel closed after {:?}",
                tunnel.attached_at.elapsed()
            );
        }
    }

    /// Close any attached tunnel because the gateway is stopping
    pub fn shutdown(&self) {
        let closed = {
            let mut state = self.lock();
            let closed = state.tunnel.take();
            state.pending.fail_all(|| TunnelError::Disconnected);
            closed
        };

        if let Some(tunnel) = closed {
            tunnel.close(CLOSE_CODE_GOING_AWAY, CLOSE_REASON_SHUTDOWN);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.lock().tunnel.is_some()
    }

    /// Connection id of the attached tunnel
    pub fn active_connection(&self) -> Option<ConnectionId> {
        self.lock().tunnel.as_ref().map(|t| t.connection_id)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Time since the session last saw activity
    pub fn idle_for(&self) -> Duration {
        self.lock().last_active.elapsed()
    }

    /// Detached, with nothing in flight, and idle for at least `idle_timeout`
    pub fn is_idle(&self, idle_timeout: Duration) -> bool {
        let state = self.lock();
        state.tunnel.is_none()
            && state.pending.is_empty()
            && state.last_active.elapsed() >= idle_timeout
    }
}

/// Withdraws a pending call when `forward` finishes or is dropped
struct PendingGuard<'a> {
    session: &'a Session,
    call_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.session.lock().pending.cancel(self.call_id).is_some() {
            debug!(subject = %self.session.subject, call_id = %self.call_id, "Pending call withdrawn");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn session() -> Arc<Session> {
        Arc::new(Session::new(
            Subject::for_test("user_1"),
            SessionConfig::default(),
        ))
    }

    fn get(path: &str) -> ProxyRequest {
        ProxyRequest {
            method: "GET".to_string(),
            path: path.to_string(),
            headers: HeaderList::new(),
            body: None,
        }
    }

    /// Read the next request frame the session queued for the tunnel
    async fn next_request(rx: &mut mpsc::Receiver<Outbound>) -> RequestEnvelope {
        match rx.recv().await {
            Some(Outbound::Frame(frame)) => RequestEnvelope::from_frame(&frame).unwrap(),
            other => panic!("expected a request frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_forward_without_tunnel() {
        let session = session();

        let err = session.forward(get("/hello")).await.unwrap_err();
        assert!(matches!(err, TunnelError::NotConnected));
        assert_eq!(session.pending_count(), 0);
        assert!(!session.is_attached());
    }

    #[tokio::test]
    async fn test_forward_resolves_matching_response() {
        let session = session();
        let (tx, mut rx) = mpsc::channel(8);
        let conn = session.attach(tx);

        let forwarding = tokio::spawn({
            let session = session.clone();
            async move { session.forward(get("/hello")).await }
        });

        let request = next_request(&mut rx).await;
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/hello");
        assert!(request.body.is_none());
        assert_eq!(session.pending_count(), 1);

        let response = ResponseEnvelope::new(request.id.clone(), 200).with_body("hello, world");
        assert!(session.on_message(conn, &response.to_frame().unwrap()));

        let result = forwarding.await.unwrap().unwrap();
        assert_eq!(result.status, 200);
        assert_eq!(result.body, "hello, world");
        assert_eq!(session.pending_count(), 0);

        // A duplicate of the same response is discarded
        assert!(!session.on_message(conn, &response.to_frame().unwrap()));
    }

    #[tokio::test]
    async fn test_concurrent_calls_correlate_by_id() {
        let session = session();
        let (tx, mut rx) = mpsc::channel(8);
        let conn = session.attach(tx);

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.forward(get("/first")).await }
        });
        let a = next_request(&mut rx).await;

        let second = tokio::spawn({
            let session = session.clone();
            async move { session.forward(get("/second")).await }
        });
        let b = next_request(&mut rx).await;
        assert_ne!(a.id, b.id);

        // Answer out of order
        let frame = ResponseEnvelope::new(b.id, 201).with_body(b.path).to_frame().unwrap();
        assert!(session.on_message(conn, &frame));
        let frame = ResponseEnvelope::new(a.id, 200).with_body(a.path).to_frame().unwrap();
        assert!(session.on_message(conn, &frame));

        assert_eq!(first.await.unwrap().unwrap().body, "/first");
        assert_eq!(second.await.unwrap().unwrap().body, "/second");
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_frames_are_ignored() {
        let session = session();
        let (tx, _rx) = mpsc::channel(8);
        let conn = session.attach(tx);

        assert!(!session.on_message(conn, "not json"));
        assert!(!session.on_message(conn, r#"{"id":"x"}"#));
        let unknown = ResponseEnvelope::new("unknown", 200).to_frame().unwrap();
        assert!(!session.on_message(conn, &unknown));
        assert!(session.is_attached());
    }

    #[tokio::test]
    async fn test_attach_replaces_previous_tunnel() {
        let session = session();
        let (old_tx, mut old_rx) = mpsc::channel(8);
        let old_conn = session.attach(old_tx);

        let in_flight = tokio::spawn({
            let session = session.clone();
            async move { session.forward(get("/slow")).await }
        });
        let stale_request = next_request(&mut old_rx).await;

        let (new_tx, mut new_rx) = mpsc::channel(8);
        let new_conn = session.attach(new_tx);
        assert_ne!(old_conn, new_conn);
        assert_eq!(session.active_connection(), Some(new_conn));

        // The old tunnel is told to close
        assert_eq!(
            old_rx.recv().await,
            Some(Outbound::Close {
                code: CLOSE_CODE_NORMAL,
                reason: CLOSE_REASON_REPLACED.to_string(),
            })
        );

        // The call in flight on the old tunnel fails
        let err = in_flight.await.unwrap().unwrap_err();
        assert!(matches!(err, TunnelError::Replaced));

        // A late response on the old connection resolves nothing
        let late = ResponseEnvelope::new(stale_request.id, 200).to_frame().unwrap();
        assert!(!session.on_message(old_conn, &late));

        // Closing the superseded connection leaves the new one attached
        session.on_close(old_conn);
        assert!(session.is_attached());

        // Later calls use the new tunnel
        let next = tokio::spawn({
            let session = session.clone();
            async move { session.forward(get("/next")).await }
        });
        let request = next_request(&mut new_rx).await;
        let frame = ResponseEnvelope::new(request.id, 204).to_frame().unwrap();
        assert!(session.on_message(new_conn, &frame));
        assert_eq!(next.await.unwrap().unwrap().status, 204);
    }

    #[tokio::test]
    async fn test_close_fails_pending_calls() {
        let session = session();
        let (tx, mut rx) = mpsc::channel(8);
        let conn = session.attach(tx);

        let in_flight = tokio::spawn({
            let session = session.clone();
            async move { session.forward(get("/hello")).await }
        });
        next_request(&mut rx).await;

        session.on_close(conn);
        let err = in_flight.await.unwrap().unwrap_err();
        assert!(matches!(err, TunnelError::Disconnected));
        assert!(!session.is_attached());
        assert_eq!(session.pending_count(), 0);

        let err = session.forward(get("/hello")).await.unwrap_err();
        assert!(matches!(err, TunnelError::NotConnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_pending_call() {
        let session = Arc::new(Session::new(
            Subject::for_test("user_1"),
            SessionConfig {
                forward_timeout: Duration::from_secs(5),
            },
        ));
        let (tx, _rx) = mpsc::channel(8);
        session.attach(tx);

        let err = session.forward(get("/hello")).await.unwrap_err();
        assert!(matches!(err, TunnelError::Timeout));
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_caller_removes_pending_call() {
        let session = session();
        let (tx, mut rx) = mpsc::channel(8);
        let conn = session.attach(tx);

        let in_flight = tokio::spawn({
            let session = session.clone();
            async move { session.forward(get("/hello")).await }
        });
        let request = next_request(&mut rx).await;
        assert_eq!(session.pending_count(), 1);

        in_flight.abort();
        let _ = in_flight.await;
        assert_eq!(session.pending_count(), 0);

        // The response that arrives afterwards is discarded
        let frame = ResponseEnvelope::new(request.id, 200).to_frame().unwrap();
        assert!(!session.on_message(conn, &frame));
    }

    #[tokio::test]
    async fn test_pump_gone_fails_call() {
        let session = session();
        let (tx, rx) = mpsc::channel(8);
        session.attach(tx);
        drop(rx);

        let err = session.forward(get("/hello")).await.unwrap_err();
        assert!(matches!(err, TunnelError::Disconnected));
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_tunnel() {
        let session = session();
        let (tx, mut rx) = mpsc::channel(8);
        session.attach(tx);

        session.shutdown();
        assert!(!session.is_attached());
        assert!(matches!(
            rx.recv().await,
            Some(Outbound::Close { code: CLOSE_CODE_GOING_AWAY, .. })
        ));
    }

    #[test]
    fn test_idle_tracking() {
        let session = session();
        assert!(session.is_idle(Duration::ZERO));
        assert!(!session.is_idle(Duration::from_secs(3600)));

        let (tx, _rx) = mpsc::channel(8);
        session.attach(tx);
        assert!(!session.is_idle(Duration::ZERO));
        assert!(session.idle_for() < Duration::from_secs(60));
    }
}
