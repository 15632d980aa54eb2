//! Server Configuration

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 3600;
pub const DEFAULT_MAX_SESSIONS: u64 = 10_000;

/// Header carrying the id of the user the upstream auth layer signed in
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,

    /// Conversations untouched for this long are dropped
    pub session_idle: Duration,
    pub max_sessions: u64,
}

impl ServerConfig {
    /// Read `BIND_ADDR`, `SESSION_IDLE_SECS` and `MAX_SESSIONS`
    pub fn from_env() -> anyhow::Result<Self> {
        let raw = std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.into());
        let bind_addr = raw
            .parse()
            .with_context(|| format!("BIND_ADDR is not a socket address: {raw}"))?;

        let idle_secs = env_u64("SESSION_IDLE_SECS", DEFAULT_SESSION_IDLE_SECS)?;
        let max_sessions = env_u64("MAX_SESSIONS", DEFAULT_MAX_SESSIONS)?;
        if idle_secs == 0 || max_sessions == 0 {
            anyhow::bail!("SESSION_IDLE_SECS and MAX_SESSIONS must be positive");
        }

        Ok(Self {
            bind_addr,
            session_idle: Duration::from_secs(idle_secs),
            max_sessions,
        })
    }
}

fn env_u64(name: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} is not a whole number: {raw}")),
        Err(_) => Ok(default),
    }
}
