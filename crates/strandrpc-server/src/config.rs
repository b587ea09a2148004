//! Server configuration.

use std::time::Duration;

use strandrpc_common::frame::DEFAULT_MAX_FRAME_SIZE;

/// Default per-operation idle timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Server construction parameters.
///
/// # Fields
///
/// - `bind_addr` - address the listener binds (default `0.0.0.0:8080`)
/// - `worker_threads` - runtime worker threads (default: available parallelism)
/// - `idle_timeout` - budget for each read-header, read-body and
///   write-response step (default 5 seconds)
/// - `max_frame_size` - largest accepted frame body (default 100 MB)
///
/// # Example
///
/// ```
/// use strandrpc_server::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::new()
///     .with_bind_addr("127.0.0.1:9000")
///     .with_worker_threads(2)
///     .with_idle_timeout(Duration::from_millis(500));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub worker_threads: usize,
    pub idle_timeout: Duration,
    pub max_frame_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_addr(mut self, bind_addr: impl Into<String>) -> Self {
        self.bind_addr = bind_addr.into();
        self
    }

    /// Binds `0.0.0.0:<port>`.
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr = format!("0.0.0.0:{}", port);
        self
    }

    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: u64) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field:
    /// - zero worker threads
    /// - zero idle timeout
    /// - zero frame size limit
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_threads == 0 {
            return Err("worker thread count must be greater than zero".to_string());
        }
        if self.idle_timeout.is_zero() {
            return Err("idle timeout must be greater than zero".to_string());
        }
        if self.max_frame_size == 0 {
            return Err("max frame size must be greater than zero".to_string());
        }
        Ok(())
    }
}
