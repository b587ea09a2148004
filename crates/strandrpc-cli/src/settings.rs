//! Server settings from flags and environment.
//!
//! Each parameter resolves as: command-line flag, then environment variable,
//! then the [`ServerConfig`] default.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use strandrpc_server::ServerConfig;

pub const ENV_BIND: &str = "STRANDRPC_BIND";
pub const ENV_WORKERS: &str = "STRANDRPC_WORKERS";
pub const ENV_IDLE_TIMEOUT_MS: &str = "STRANDRPC_IDLE_TIMEOUT_MS";

/// Flag values as parsed; `None` means the flag was not given.
#[derive(Debug, Default, Clone)]
pub struct ServerFlags {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub workers: Option<usize>,
    pub idle_timeout_ms: Option<u64>,
    pub max_frame_size: Option<u64>,
}

/// Resolves `flags` against `env` into a validated config.
///
/// `env` looks up one variable; pass `|name| std::env::var(name).ok()` for
/// the process environment.
pub fn server_config(
    flags: &ServerFlags,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ServerConfig> {
    let mut config = ServerConfig::new();

    if let Some(bind) = resolve(flags.bind.clone(), ENV_BIND, &env)? {
        config = config.with_bind_addr(bind);
    }
    // An explicit port replaces whatever the bind address said.
    if let Some(port) = flags.port {
        config = config.with_port(port);
    }
    if let Some(workers) = resolve(flags.workers, ENV_WORKERS, &env)? {
        config = config.with_worker_threads(workers);
    }
    if let Some(ms) = resolve(flags.idle_timeout_ms, ENV_IDLE_TIMEOUT_MS, &env)? {
        config = config.with_idle_timeout(Duration::from_millis(ms));
    }
    if let Some(max) = flags.max_frame_size {
        config = config.with_max_frame_size(max);
    }

    config
        .validate()
        .map_err(|e| anyhow!("invalid server configuration: {}", e))?;
    Ok(config)
}

fn resolve<T>(
    flag: Option<T>,
    var: &str,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    if flag.is_some() {
        return Ok(flag);
    }
    match env(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("invalid {}='{}': {}", var, raw, e)),
        None => Ok(None),
    }
}
