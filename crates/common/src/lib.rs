//! Common utilities and types for the HTTP relay
//!
//! This crate provides the wire envelopes, pending-call bookkeeping, errors and
//! helpers shared by the gateway (edge server) and the daemon (local agent).

pub mod constants;
pub mod error;
pub mod models;
pub mod protocol;
pub mod utils;
pub mod validation;

// Re-export commonly used types for convenience
pub use error::{Result, TunnelError};
pub use models::{CallOutcome, PendingCall, PendingCalls};
pub use protocol::{
    HeaderList, RequestEnvelope, ResponseEnvelope, is_ping, is_pong, method_has_payload,
};
pub use utils::{generate_call_id, header_list_from_map, header_list_to_map, is_hop_by_hop};
