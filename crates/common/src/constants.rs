/// Path on the gateway where daemons attach their tunnel
pub const TUNNEL_PATH: &str = "/tunnel";

/// Path on the gateway that exchanges a session credential for a machine credential
pub const REGISTER_PATH: &str = "/daemon/register";

/// Text frame sent by the daemon to keep an idle tunnel alive
pub const PING_FRAME: &str = "ping";

/// Text frame the gateway answers a [`PING_FRAME`] with
pub const PONG_FRAME: &str = "pong";

/// Close reason sent to a tunnel superseded by a newer attach
pub const CLOSE_REASON_REPLACED: &str = "replaced";

/// Close reason sent to attached tunnels when the gateway stops
pub const CLOSE_REASON_SHUTDOWN: &str = "shutting down";

/// Normal closure code (RFC 6455)
pub const CLOSE_CODE_NORMAL: u16 = 1000;

/// Going-away closure code (RFC 6455)
pub const CLOSE_CODE_GOING_AWAY: u16 = 1001;

/// Heartbeat interval to keep the tunnel alive (30 seconds)
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Heartbeat intervals without any frame after which a tunnel is treated as dead
pub const HEARTBEAT_MISSED_LIMIT: u32 = 3;

/// Silence after which either side drops the tunnel (90 seconds)
pub const TUNNEL_IDLE_TIMEOUT_SECS: u64 = HEARTBEAT_INTERVAL_SECS * HEARTBEAT_MISSED_LIMIT as u64;

/// Gateway wait for a correlated response before answering 504
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Daemon timeout for the local HTTP call (kept under the gateway timeout)
pub const LOCAL_REQUEST_TIMEOUT_SECS: u64 = 25;

/// Daemon timeout for the WebSocket handshake
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Maximum request/response body size (2 MB)
pub const MAX_BODY_SIZE_BYTES: usize = 2 * 1024 * 1024;

/// Minimum delay for exponential backoff reconnection (1 second)
pub const RECONNECT_MIN_DELAY_MS: u64 = 1000;

/// Maximum delay for exponential backoff reconnection (60 seconds)
pub const RECONNECT_MAX_DELAY_MS: u64 = 60000;

/// Multiplier for exponential backoff reconnection
pub const RECONNECT_MULTIPLIER: f64 = 2.0;

/// Upper bound on live sessions held by the gateway registry
pub const MAX_SESSIONS: usize = 10_000;

/// Detached sessions idle for longer than this are evicted (1 hour)
pub const SESSION_IDLE_TIMEOUT_SECS: u64 = 3600;

/// How often the gateway sweeps idle sessions (1 minute)
pub const SESSION_SWEEP_INTERVAL_SECS: u64 = 60;

/// Lifetime of machine credentials minted by the register endpoint (1 hour)
pub const MACHINE_TOKEN_TTL_SECS: u64 = 3600;

/// Frames buffered per tunnel before senders wait
pub const TUNNEL_OUTBOUND_BUFFER: usize = 256;
