use anyhow::{Context, Result, bail};
use clap::Parser;
use http_relay_common::constants::{
    CONNECT_TIMEOUT_SECS, HEARTBEAT_INTERVAL_SECS, HEARTBEAT_MISSED_LIMIT,
    LOCAL_REQUEST_TIMEOUT_SECS,
    RECONNECT_MAX_DELAY_MS, RECONNECT_MIN_DELAY_MS, RECONNECT_MULTIPLIER, TUNNEL_PATH,
};
use std::time::Duration;
use url::Url;

/// CLI arguments for the relay daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "relayd")]
#[command(about = "Keeps a tunnel open to the relay gateway and serves it from a local service", long_about = None)]
#[command(version)]
pub struct Args {
    /// WebSocket tunnel endpoint on the gateway
    #[arg(
        short,
        long,
        env = "RELAY_URL",
        default_value = "ws://127.0.0.1:8787/tunnel"
    )]
    pub endpoint: String,

    /// Machine credential issued by the gateway's register endpoint
    #[arg(short, long, env = "RELAY_DAEMON_TOKEN")]
    pub token: String,

    /// Base URL of the local service requests are delivered to
    #[arg(
        short,
        long,
        env = "RELAY_LOCAL_URL",
        default_value = "http://127.0.0.1:3000"
    )]
    pub local: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Connection timeout in seconds
    #[arg(long, default_value_t = CONNECT_TIMEOUT_SECS)]
    pub connect_timeout: u64,

    /// Request timeout in seconds when calling the local service
    #[arg(long, default_value_t = LOCAL_REQUEST_TIMEOUT_SECS)]
    pub request_timeout: u64,

    /// Seconds between keepalive pings; three silent intervals drop the connection
    #[arg(long, default_value_t = HEARTBEAT_INTERVAL_SECS)]
    pub heartbeat_interval: u64,

    /// Give up after this many consecutive failed connection attempts
    #[arg(long)]
    pub max_attempts: Option<usize>,
}

/// Configuration for the tunnel endpoint
#[derive(Debug, Clone)]
pub struct Config {
    /// Local service base URL without trailing slash (e.g., "http://127.0.0.1:3000")
    pub local_address: String,

    /// WebSocket endpoint URL
    pub websocket_url: String,

    /// Bearer credential presented on connect
    pub token: String,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Request timeout when calling local service
    pub request_timeout: Duration,

    /// Heartbeat interval
    pub heartbeat_interval: Duration,

    /// Silence from the gateway after which the connection is dropped
    pub heartbeat_timeout: Duration,

    /// Reconnection strategy
    pub reconnect_config: ReconnectConfig,
}

/// Reconnection configuration with exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: Option<usize>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(RECONNECT_MIN_DELAY_MS),
            max_delay: Duration::from_millis(RECONNECT_MAX_DELAY_MS),
            multiplier: RECONNECT_MULTIPLIER,
            max_attempts: None, // Infinite retries
        }
    }
}

impl ReconnectConfig {
    /// Delay that follows `current` in the backoff sequence
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next = (current.as_millis() as f64 * self.multiplier)
            .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(next as u64).max(self.min_delay)
    }

    /// Whether `attempt` consecutive failures exhaust the retry budget
    pub fn is_exhausted(&self, attempt: usize) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}

impl Config {
    /// Build a config with defaults for everything but the addresses and token
    pub fn new(
        websocket_url: impl Into<String>,
        token: impl Into<String>,
        local_address: impl Into<String>,
    ) -> Self {
        Self {
            local_address: local_address.into().trim_end_matches('/').to_string(),
            websocket_url: websocket_url.into(),
            token: token.into(),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(LOCAL_REQUEST_TIMEOUT_SECS),
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            heartbeat_timeout: Duration::from_secs(HEARTBEAT_INTERVAL_SECS) * HEARTBEAT_MISSED_LIMIT,
            reconnect_config: ReconnectConfig::default(),
        }
    }

    pub fn from_args(args: Args) -> Result<Self> {
        let endpoint = Url::parse(&args.endpoint)
            .with_context(|| format!("Invalid tunnel endpoint: {}", args.endpoint))?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            bail!("Tunnel endpoint must use ws:// or wss://, got {}", endpoint);
        }
        if endpoint.path() != TUNNEL_PATH {
            tracing::warn!(
                "Tunnel endpoint path is {}, the gateway listens on {}",
                endpoint.path(),
                TUNNEL_PATH
            );
        }

        let local = Url::parse(&args.local)
            .with_context(|| format!("Invalid local service URL: {}", args.local))?;
        if !matches!(local.scheme(), "http" | "https") {
            bail!("Local service must use http:// or https://, got {}", local);
        }

        if args.token.trim().is_empty() {
            bail!("Daemon token must not be empty");
        }

        let mut config = Self::new(args.endpoint, args.token, args.local);
        config.connect_timeout = Duration::from_secs(args.connect_timeout);
        config.request_timeout = Duration::from_secs(args.request_timeout);
        config.heartbeat_interval = Duration::from_secs(args.heartbeat_interval.max(1));
        config.heartbeat_timeout = config.heartbeat_interval * HEARTBEAT_MISSED_LIMIT;
        config.reconnect_config.max_attempts = args.max_attempts;
        Ok(config)
    }
}
