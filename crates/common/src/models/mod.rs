mod pending;

pub use pending::{CallOutcome, PendingCall, PendingCalls};
