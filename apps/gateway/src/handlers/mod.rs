//! Handler modules
//!
//! This module contains the request handlers behind the gateway routes and the
//! tunnel socket pump.

pub mod cleanup;
pub mod connect;
pub mod disconnect;
pub mod forwarding;
pub mod register;
pub mod response;

pub use cleanup::{handle_cleanup, spawn_cleanup};
pub use connect::handle_connect;
pub use disconnect::handle_disconnect;
pub use forwarding::handle_forwarding;
pub use register::handle_register;
pub use response::handle_response;
