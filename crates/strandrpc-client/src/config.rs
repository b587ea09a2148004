//! Client and pool configuration.

use std::time::Duration;

use strandrpc_common::frame::DEFAULT_MAX_FRAME_SIZE;

/// Default timeout for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-thread pool size.
pub const DEFAULT_MAX_CONNECTIONS: usize = 16;

/// Where a session connects and the limits it applies.
///
/// # Example
///
/// ```
/// use strandrpc_client::ClientConfig;
///
/// let config = ClientConfig::from_destination("localhost:8080").unwrap();
/// assert_eq!(config.host, "localhost");
/// assert_eq!(config.port, 8080);
/// assert_eq!(config.destination(), "localhost:8080");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub max_frame_size: u64,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Parses `"host:port"`. IPv6 hosts may be bracketed.
    pub fn from_destination(destination: &str) -> Result<Self, String> {
        let (host, port) = destination
            .rsplit_once(':')
            .ok_or_else(|| format!("destination '{}' is not host:port", destination))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("invalid port in '{}': {}", destination, e))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(format!("destination '{}' has no host", destination));
        }
        Ok(Self::new(host, port))
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: u64) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// `"host:port"`, the key the outbound pool uses.
    pub fn destination(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Outbound pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Most sessions kept open per worker thread.
    pub max_connections: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl PoolConfig {
    pub fn new(max_connections: usize) -> Self {
        Self { max_connections }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be greater than zero".to_string());
        }
        Ok(())
    }
}
