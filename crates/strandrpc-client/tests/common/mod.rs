//! Shared fixtures for the end-to-end tests.

#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use strandrpc_client::{ClientConfig, Procedure};
use strandrpc_server::{Registry, RpcServer, ServerConfig, Shared};
use tokio::sync::oneshot;

pub const ECHO: Procedure<(String,), String> = Procedure::function("echo");
pub const ADD: Procedure<(i32, i32), i32> = Procedure::function("add");
pub const FAIL: Procedure<(), ()> = Procedure::function("fail");
pub const SLOW: Procedure<(u64,), u64> = Procedure::function("slow");
pub const MISSING: Procedure<(), ()> = Procedure::function("missing");
pub const HITS: Procedure<(), usize> = Procedure::method("Tally", "hits");

pub struct Tally {
    hits: AtomicUsize,
}

async fn slow(millis: u64) -> anyhow::Result<u64> {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    Ok(millis)
}

pub fn registry() -> Registry {
    let tally = Shared::new(Tally {
        hits: AtomicUsize::new(0),
    });

    let mut builder = Registry::builder();
    builder
        .function(&ECHO, |(s,)| Ok(s))
        .unwrap()
        .function(&ADD, |(a, b)| Ok(a + b))
        .unwrap()
        .function(&FAIL, |()| Err(anyhow::anyhow!("deliberate failure")))
        .unwrap()
        .suspending_function(&SLOW, |(millis,)| slow(millis))
        .unwrap()
        .method(&HITS, tally, |t: &Tally, ()| {
            Ok(t.hits.fetch_add(1, Ordering::SeqCst) + 1)
        })
        .unwrap();
    builder.build()
}

/// A real server on an ephemeral port, running on its own runtime thread.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TestServer {
    pub fn start(idle_timeout: Duration) -> Self {
        let (addr_tx, addr_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let config = ServerConfig::new()
                    .with_bind_addr("127.0.0.1:0")
                    .with_idle_timeout(idle_timeout);
                let server = RpcServer::bind(&config, registry()).await.unwrap();
                addr_tx.send(server.local_addr().unwrap()).unwrap();
                server
                    .run_until(async {
                        let _ = shutdown_rx.await;
                    })
                    .await
                    .unwrap();
            });
        });

        let addr = addr_rx.recv().unwrap();
        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new("127.0.0.1", self.addr.port())
    }

    /// Signals shutdown without waiting.
    pub fn signal_shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Signals shutdown and waits for every connection to drain.
    pub fn stop(mut self) {
        self.signal_shutdown();
        if let Some(thread) = self.thread.take() {
            thread.join().unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.signal_shutdown();
    }
}

/// A listener that accepts connections and drops them at once, counting
/// how many it saw.
pub struct SlammingListener {
    pub addr: SocketAddr,
    pub accepts: Arc<AtomicUsize>,
}

impl SlammingListener {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepts);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        counter.fetch_add(1, Ordering::SeqCst);
                        drop(stream);
                    }
                    Err(_) => break,
                }
            }
        });

        Self { addr, accepts }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new("127.0.0.1", self.addr.port())
    }

    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }
}
