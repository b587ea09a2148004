//! StrandRPC Client
//!
//! Calls procedures on a StrandRPC server. A procedure is declared once as a
//! [`Procedure`] constant that both the server and its callers compile in;
//! the routing key is derived from it on each side.
//!
//! # Example
//!
//! ```no_run
//! use strandrpc_client::{AsyncClient, ClientConfig, Procedure};
//!
//! const ECHO: Procedure<(String,), String> = Procedure::function("echo");
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = AsyncClient::connect(ClientConfig::new("127.0.0.1", 8080)).await?;
//!     let reply = client.call(&ECHO, &("hello".to_string(),)).await?;
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod pool;
pub mod session;
pub mod stub;

pub use config::{ClientConfig, PoolConfig};
pub use pool::{LruPool, OutboundPool, PooledSession};
pub use session::{AsyncSession, BlockingSession};
pub use stub::{AsyncClient, Client, PooledClient};

pub use strandrpc_common::{ErrorKind, Procedure, RpcError, TransportError};
