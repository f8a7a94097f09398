//! Development helper that mints relay credentials from the shared secret

use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};
use http_relay_gateway::{JwtIdentityProvider, TokenKind};
use std::time::Duration;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Session,
    Machine,
}

impl From<Kind> for TokenKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Session => TokenKind::Session,
            Kind::Machine => TokenKind::Machine,
        }
    }
}

/// Mint a session or machine token for a subject
#[derive(Parser, Debug)]
#[command(name = "relay-token")]
#[command(version)]
struct Args {
    /// Shared HS256 secret, same as the gateway's
    #[arg(long, env = "RELAY_JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,

    /// Subject the token authenticates
    #[arg(long)]
    subject: String,

    /// Kind of credential to mint
    #[arg(long, value_enum, default_value = "session")]
    kind: Kind,

    /// Lifetime in seconds
    #[arg(long, default_value_t = 3600)]
    ttl: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let provider = JwtIdentityProvider::new(&args.jwt_secret);
    let issued = provider
        .mint(&args.subject, args.kind.into(), Duration::from_secs(args.ttl))
        .map_err(|e| anyhow!("Failed to mint token: {}", e))?;

    eprintln!("Expires at {}", issued.expires_at.to_rfc3339());
    println!("{}", issued.token);
    Ok(())
}
