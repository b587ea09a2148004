//! TCP listener.
//!
//! [`RpcServer`] owns the bound socket and the frozen [`Registry`]. Each
//! accepted connection gets its own task running
//! [`connection::serve`](crate::connection::serve). A failed accept is
//! logged and the loop continues.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::connection::{self, ConnectionSettings};
use crate::error::{Result, ServerError};
use crate::registry::Registry;

/// Pause after a failed accept, so that running out of file descriptors
/// does not turn into a busy loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct RpcServer {
    listener: TcpListener,
    registry: Arc<Registry>,
    settings: ConnectionSettings,
}

impl RpcServer {
    /// Validates `config` and binds its address.
    pub async fn bind(config: &ServerConfig, registry: Registry) -> Result<Self> {
        config.validate().map_err(ServerError::Config)?;

        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr.clone(),
                source,
            })?;

        tracing::info!(
            addr = %listener.local_addr()?,
            handlers = registry.len(),
            "RPC server listening"
        );

        Ok(Self {
            listener,
            registry: Arc::new(registry),
            settings: ConnectionSettings::from(config),
        })
    }

    /// The address actually bound, useful after binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Accepts connections until `shutdown` resolves, then waits for every
    /// open connection to finish.
    ///
    /// Connections still open at shutdown run until their peer closes them
    /// or the idle timeout reaps them.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let RpcServer {
            listener,
            registry,
            settings,
        } = self;
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(peer = %peer, "Accepted connection");
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!(peer = %peer, "Failed to set TCP_NODELAY: {}", e);
                        }
                        let registry = Arc::clone(&registry);
                        let span = tracing::debug_span!("connection", peer = %peer);
                        connections.spawn(
                            async move {
                                let _ = connection::serve(stream, registry, settings).await;
                            }
                            .instrument(span),
                        );
                    }
                    Err(e) => {
                        tracing::warn!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    log_join(joined);
                }
            }
        }

        drop(listener);
        tracing::info!(open = connections.len(), "Stopped accepting, draining connections");
        while let Some(joined) = connections.join_next().await {
            log_join(joined);
        }
        tracing::info!("RPC server stopped");
        Ok(())
    }

    /// Runs until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Builds a multi-threaded runtime with `config.worker_threads` workers,
    /// binds, and serves until a termination signal arrives.
    pub fn start(config: ServerConfig, registry: Registry) -> Result<()> {
        config.validate().map_err(ServerError::Config)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name("strandrpc-worker")
            .enable_all()
            .build()
            .map_err(ServerError::Runtime)?;

        runtime.block_on(async {
            let server = RpcServer::bind(&config, registry).await?;
            server.run().await
        })
    }
}

fn log_join(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!("Connection task panicked: {}", e);
        }
    }
}

/// Resolves on the first termination signal.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
