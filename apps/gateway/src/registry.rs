use crate::auth::Subject;
use crate::session::{Session, SessionConfig};
use http_relay_common::{Result, TunnelError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Maps each subject to its session
///
/// Sessions are created on first use. The registry holds at most
/// `max_sessions`; detached sessions that nobody else references are evicted
/// once idle for `idle_timeout`.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Subject, Arc<Session>>>,
    session_config: SessionConfig,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(session_config: SessionConfig, max_sessions: usize, idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            session_config,
            max_sessions,
            idle_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Subject, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Session for `subject`, created if it does not exist yet
    pub fn get(&self, subject: &Subject) -> Result<Arc<Session>> {
        let mut sessions = self.lock();

        if let Some(session) = sessions.get(subject) {
            return Ok(session.clone());
        }

        if sessions.len() >= self.max_sessions {
            let evicted = Self::evict_idle(&mut sessions, self.idle_timeout);
            if sessions.len() >= self.max_sessions {
                warn!(
                    subject = %subject,
                    max_sessions = self.max_sessions,
                    evicted,
                    "Session registry full"
                );
                return Err(TunnelError::CapacityExceeded);
            }
        }

        let session = Arc::new(Session::new(subject.clone(), self.session_config.clone()));
        sessions.insert(subject.clone(), session.clone());
        debug!(subject = %subject, sessions = sessions.len(), "Session created");
        Ok(session)
    }

    /// Evict idle sessions, returning how many were removed
    pub fn sweep_idle(&self) -> usize {
        let mut sessions = self.lock();
        let evicted = Self::evict_idle(&mut sessions, self.idle_timeout);
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    fn evict_idle(sessions: &mut HashMap<Subject, Arc<Session>>, idle_timeout: Duration) -> usize {
        let before = sessions.len();
        // A strong count of one means no handler or socket pump holds the session
        sessions.retain(|_, session| !(Arc::strong_count(session) == 1 && session.is_idle(idle_timeout)));
        before - sessions.len()
    }

    /// Close every attached tunnel
    pub fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = self.lock().values().cloned().collect();
        for session in sessions {
            session.shutdown();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of sessions with an attached tunnel
    pub fn attached_count(&self) -> usize {
        self.lock().values().filter(|s| s.is_attached()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn registry(max_sessions: usize, idle_timeout: Duration) -> SessionRegistry {
        SessionRegistry::new(SessionConfig::default(), max_sessions, idle_timeout)
    }

    #[test]
    fn test_get_creates_once() {
        let registry = registry(10, Duration::from_secs(3600));
        let a = registry.get(&Subject::for_test("alice")).unwrap();
        let again = registry.get(&Subject::for_test("alice")).unwrap();
        let b = registry.get(&Subject::for_test("bob")).unwrap();

        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.subject().as_str(), "alice");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_subjects_do_not_share_tunnels() {
        let registry = registry(10, Duration::from_secs(3600));
        let alice = registry.get(&Subject::for_test("alice")).unwrap();
        let bob = registry.get(&Subject::for_test("bob")).unwrap();

        let (tx, _rx) = mpsc::channel(8);
        alice.attach(tx);

        assert!(alice.is_attached());
        assert!(!bob.is_attached());
        assert_eq!(registry.attached_count(), 1);
    }

    #[test]
    fn test_sweep_only_evicts_unreferenced_idle_sessions() {
        let registry = registry(10, Duration::ZERO);

        // Referenced elsewhere
        let held = registry.get(&Subject::for_test("held")).unwrap();

        // Attached
        let attached = registry.get(&Subject::for_test("attached")).unwrap();
        let (tx, _rx) = mpsc::channel(8);
        attached.attach(tx);
        drop(attached);

        // Idle and unreferenced
        drop(registry.get(&Subject::for_test("idle")).unwrap());

        assert_eq!(registry.sweep_idle(), 1);
        assert_eq!(registry.len(), 2);
        assert!(held.subject().as_str() == "held");
    }

    #[test]
    fn test_sweep_respects_idle_timeout() {
        let registry = registry(10, Duration::from_secs(3600));
        drop(registry.get(&Subject::for_test("fresh")).unwrap());

        assert_eq!(registry.sweep_idle(), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_capacity() {
        let registry = registry(2, Duration::from_secs(3600));
        let _a = registry.get(&Subject::for_test("a")).unwrap();
        let _b = registry.get(&Subject::for_test("b")).unwrap();

        let err = registry.get(&Subject::for_test("c")).unwrap_err();
        assert!(matches!(err, TunnelError::CapacityExceeded));

        // Existing subjects are still served
        assert!(registry.get(&Subject::for_test("a")).is_ok());
    }

    #[test]
    fn test_full_registry_reclaims_idle_sessions() {
        let registry = registry(1, Duration::ZERO);
        drop(registry.get(&Subject::for_test("a")).unwrap());

        let b = registry.get(&Subject::for_test("b")).unwrap();
        assert_eq!(b.subject().as_str(), "b");
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_detaches_all() {
        let registry = registry(10, Duration::from_secs(3600));
        let session = registry.get(&Subject::for_test("alice")).unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        session.attach(tx);

        registry.shutdown();
        assert_eq!(registry.attached_count(), 0);
        assert!(rx.recv().await.is_some());
    }
}
