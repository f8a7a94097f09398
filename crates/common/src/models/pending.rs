use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tokio::sync::oneshot;

use crate::error::{Result, TunnelError};
use crate::protocol::ResponseEnvelope;

/// Outcome delivered to whoever awaits a pending call
pub type CallOutcome = Result<ResponseEnvelope>;

/// A forwarded request waiting for its correlated response
#[derive(Debug)]
pub struct PendingCall {
    /// Call identifier shared with the request envelope
    pub id: String,

    responder: oneshot::Sender<CallOutcome>,
}

impl PendingCall {
    /// Create a pending call and the receiver its creator awaits
    pub fn new(id: String) -> (Self, oneshot::Receiver<CallOutcome>) {
        let (responder, receiver) = oneshot::channel();
        let call = Self {
            id,
            responder,
        };
        (call, receiver)
    }

    /// Complete the call. Returns false if the waiter already went away.
    pub fn complete(self, outcome: CallOutcome) -> bool {
        self.responder.send(outcome).is_ok()
    }
}

/// In-flight calls keyed by call id
///
/// Every path that finishes a call (`resolve`, `cancel`, `fail_all`) removes
/// the entry, so a call leaves the table exactly once and later attempts for
/// the same id are no-ops.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: HashMap<String, PendingCall>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call under a fresh id
    pub fn register(&mut self, id: &str) -> Result<oneshot::Receiver<CallOutcome>> {
        match self.calls.entry(id.to_string()) {
            Entry::Occupied(_) => Err(TunnelError::InternalError(format!(
                "duplicate call id {}",
                id
            ))),
            Entry::Vacant(slot) => {
                let (call, receiver) = PendingCall::new(id.to_string());
                slot.insert(call);
                Ok(receiver)
            }
        }
    }

    /// Hand a response to the call with the same id.
    /// Returns false when no such call exists (unknown, duplicate or late).
    pub fn resolve(&mut self, response: ResponseEnvelope) -> bool {
        match self.calls.remove(&response.id) {
            Some(call) => {
                // A waiter that gave up between removal and send is fine to ignore.
                call.complete(Ok(response));
                true
            }
            None => false,
        }
    }

    /// Drop a call without completing it (timeout or caller cancellation)
    pub fn cancel(&mut self, id: &str) -> Option<PendingCall> {
        self.calls.remove(id)
    }

    /// Fail every outstanding call, returning how many were failed
    pub fn fail_all(&mut self, error: impl Fn() -> TunnelError) -> usize {
        let count = self.calls.len();
        for (_, call) in self.calls.drain() {
            call.complete(Err(error()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
