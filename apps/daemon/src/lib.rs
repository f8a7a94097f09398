//! Daemon side of the HTTP relay
//!
//! The [`TunnelEndpoint`] keeps one outbound WebSocket open to the gateway,
//! answers each request envelope by calling the local service through
//! [`LocalClient`], and reconnects with exponential backoff.

pub mod config;
pub mod endpoint;
pub mod local;

pub use config::{Args, Config, ReconnectConfig};
pub use endpoint::{ConnectionState, TunnelEndpoint};
pub use local::LocalClient;
