use std::net::SocketAddr;

use anyhow::Context;
use session_dispatch::SessionConfig;
use session_dispatch::config::parse_flag;

const DEFAULT_ADDR: &str = "127.0.0.1:8090";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub log_filter: String,
    pub session: SessionConfig,
    /// Attach an in-process controller at startup so the status routes have
    /// something to show.
    pub demo_controller: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_addr = lookup("SESSION_HOST_ADDR").unwrap_or_else(|| DEFAULT_ADDR.into());
        let bind_addr: SocketAddr = raw_addr
            .parse()
            .with_context(|| format!("invalid SESSION_HOST_ADDR {raw_addr:?}"))?;
        let log_filter = lookup("RUST_LOG")
            .unwrap_or_else(|| "info,session_host=debug,session.admission=debug".into());
        let demo_controller = lookup("SESSION_DEMO_CONTROLLER")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);
        Ok(Self {
            bind_addr,
            log_filter,
            session: SessionConfig::from_lookup(&lookup),
            demo_controller,
        })
    }
}
