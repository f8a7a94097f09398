//! CleanupHandler - Periodic eviction of idle sessions
//!
//! Sessions that are detached, have nothing in flight and have been idle past
//! the configured timeout are dropped from the registry.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::registry::SessionRegistry;

/// Run one cleanup pass, returning how many sessions were evicted
pub fn handle_cleanup(registry: &SessionRegistry) -> usize {
    let evicted = registry.sweep_idle();
    debug!(
        evicted,
        sessions = registry.len(),
        attached = registry.attached_count(),
        "Cleanup completed"
    );
    evicted
}

/// Spawn the background task that runs cleanup every `interval`
pub fn spawn_cleanup(registry: Arc<SessionRegistry>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            handle_cleanup(&registry);
        }
    })
}
