use anyhow::{Result, bail};
use clap::Parser;
use http_relay_common::constants::{
    MACHINE_TOKEN_TTL_SECS, MAX_SESSIONS, REQUEST_TIMEOUT_SECS, SESSION_IDLE_TIMEOUT_SECS,
    TUNNEL_IDLE_TIMEOUT_SECS,
};
use std::net::SocketAddr;
use std::time::Duration;

/// CLI arguments for the relay gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "relay-gateway")]
#[command(about = "Edge gateway that forwards authenticated HTTP requests over daemon tunnels", long_about = None)]
#[command(version)]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "RELAY_LISTEN", default_value = "0.0.0.0:8787")]
    pub listen: SocketAddr,

    /// Shared HS256 secret used to verify and mint credentials
    #[arg(long, env = "RELAY_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Allowed CORS origin (any origin when unset)
    #[arg(long, env = "RELAY_CORS_ORIGIN")]
    pub cors_origin: Option<String>,

    /// Seconds to wait for a tunnelled response
    #[arg(long, env = "RELAY_REQUEST_TIMEOUT", default_value_t = REQUEST_TIMEOUT_SECS)]
    pub request_timeout: u64,

    /// Upper bound on live sessions
    #[arg(long, env = "RELAY_MAX_SESSIONS", default_value_t = MAX_SESSIONS)]
    pub max_sessions: usize,

    /// Seconds a detached session may stay idle before eviction
    #[arg(long, env = "RELAY_SESSION_IDLE_TIMEOUT", default_value_t = SESSION_IDLE_TIMEOUT_SECS)]
    pub session_idle_timeout: u64,

    /// Seconds without any frame after which an attached tunnel is dropped
    #[arg(long, env = "RELAY_TUNNEL_IDLE_TIMEOUT", default_value_t = TUNNEL_IDLE_TIMEOUT_SECS)]
    pub tunnel_idle_timeout: u64,

    /// Lifetime in seconds of machine credentials minted for daemons
    #[arg(long, env = "RELAY_MACHINE_TOKEN_TTL", default_value_t = MACHINE_TOKEN_TTL_SECS)]
    pub machine_token_ttl: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub jwt_secret: String,
    pub cors_origin: Option<String>,
    pub request_timeout: Duration,
    pub max_sessions: usize,
    pub session_idle_timeout: Duration,
    pub tunnel_idle_timeout: Duration,
    pub machine_token_ttl: Duration,
}

impl Config {
    /// Configuration with defaults for everything but the secret
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8787)),
            jwt_secret: jwt_secret.into(),
            cors_origin: None,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            max_sessions: MAX_SESSIONS,
            session_idle_timeout: Duration::from_secs(SESSION_IDLE_TIMEOUT_SECS),
            tunnel_idle_timeout: Duration::from_secs(TUNNEL_IDLE_TIMEOUT_SECS),
            machine_token_ttl: Duration::from_secs(MACHINE_TOKEN_TTL_SECS),
        }
    }

    pub fn from_args(args: Args) -> Result<Self> {
        if args.jwt_secret.trim().is_empty() {
            bail!("JWT secret must not be empty");
        }
        if args.max_sessions == 0 {
            bail!("--max-sessions must be at least 1");
        }
        if args.request_timeout == 0 {
            bail!("--request-timeout must be at least 1 second");
        }
        if args.tunnel_idle_timeout == 0 {
            bail!("--tunnel-idle-timeout must be at least 1 second");
        }

        Ok(Self {
            listen: args.listen,
            jwt_secret: args.jwt_secret,
            cors_origin: args.cors_origin.filter(|o| !o.trim().is_empty()),
            request_timeout: Duration::from_secs(args.request_timeout),
            max_sessions: args.max_sessions,
            session_idle_timeout: Duration::from_secs(args.session_idle_timeout),
            tunnel_idle_timeout: Duration::from_secs(args.tunnel_idle_timeout),
            machine_token_ttl: Duration::from_secs(args.machine_token_ttl),
        })
    }
}
