//! Wire format of the tunnel
//!
//! Every frame is a WebSocket text message: either a JSON envelope or one of
//! the bare keepalive words [`PING_FRAME`] / [`PONG_FRAME`].

mod headers;
mod request;
mod response;

pub use headers::HeaderList;
pub use request::{RequestEnvelope, method_has_payload};
pub use response::ResponseEnvelope;

use crate::constants::{PING_FRAME, PONG_FRAME};

/// Whether a text frame is the keepalive ping
pub fn is_ping(frame: &str) -> bool {
    frame == PING_FRAME
}

/// Whether a text frame is the keepalive pong
pub fn is_pong(frame: &str) -> bool {
    frame == PONG_FRAME
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keepalive_frames() {
        assert!(is_ping("ping"));
        assert!(!is_ping("PING"));
        assert!(!is_ping(r#"{"id":"ping"}"#));
        assert!(is_pong("pong"));
        assert!(!is_pong("ping"));
    }

    #[test]
    fn test_keepalive_is_not_an_envelope() {
        assert!(RequestEnvelope::from_frame(PING_FRAME).is_err());
        assert!(ResponseEnvelope::from_frame(PONG_FRAME).is_err());
    }
}
