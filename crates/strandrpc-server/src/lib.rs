//! StrandRPC Server
//!
//! This crate turns a set of registered Rust functions into a TCP service:
//!
//! - [`RegistryBuilder`] collects handlers under their routing keys and
//!   freezes them into an immutable [`Registry`]
//! - [`RpcServer`] accepts connections and spawns one connection task per
//!   socket
//! - each connection task reads a request frame, dispatches it, writes the
//!   response frame, and repeats, racing every IO step against the idle
//!   timeout
//!
//! # Example
//!
//! ```no_run
//! use strandrpc_common::Procedure;
//! use strandrpc_server::{Registry, RpcServer, ServerConfig};
//!
//! const ADD: Procedure<(i32, i32), i32> = Procedure::function("add");
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut builder = Registry::builder();
//!     builder.function(&ADD, |(a, b)| Ok(a + b))?;
//!
//!     RpcServer::start(ServerConfig::default(), builder.build())?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod instance;
pub mod registry;
pub mod server;

pub use config::ServerConfig;
pub use error::{ConnectionError, RegistryError, Result, ServerError};
pub use handler::{HandlerKind, ImmediateHandler, SuspendingHandler};
pub use instance::{InstanceProvider, PerThread, Shared, SharedProvider};
pub use registry::{HandlerEntry, Registry, RegistryBuilder};
pub use server::RpcServer;
