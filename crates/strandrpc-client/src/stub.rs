//! RPC stubs.
//!
//! Three ways to make a call, all with the same semantics:
//!
//! - [`Client`]: blocking, owns one [`BlockingSession`]
//! - [`AsyncClient`]: non-blocking, owns one [`AsyncSession`]
//! - [`PooledClient`]: non-blocking, borrows a session from the calling
//!   thread's [`OutboundPool`]
//!
//! A call encodes its arguments, exchanges one request frame for one response
//! frame, and decodes the result. If the exchange fails at the transport
//! level the session is reconnected once and the exchange retried once; a
//! second failure, including a failed reconnect, is returned to the caller.
//! Protocol failures and non-success statuses are never retried.

use serde::de::DeserializeOwned;
use serde::Serialize;
use strandrpc_common::{ArgList, Call, ExchangeError, Procedure, RpcError, TransportError, TypeTag};

use crate::config::{ClientConfig, PoolConfig};
use crate::pool::OutboundPool;
use crate::session::{AsyncSession, BlockingSession};

/// What the first failed attempt means for the call.
enum FirstAttempt {
    Done(Vec<u8>),
    Retry,
}

fn first_attempt<Ret>(
    call: &Call<Ret>,
    result: Result<Vec<u8>, ExchangeError>,
) -> Result<FirstAttempt, RpcError>
where
    Ret: TypeTag + DeserializeOwned,
{
    match result {
        Ok(frame) => Ok(FirstAttempt::Done(frame)),
        Err(ExchangeError::Protocol(source)) => Err(call.protocol_error(source)),
        Err(ExchangeError::Transport(source)) => {
            tracing::debug!(
                routing_key = %call.routing_key(),
                "Transport failure, reconnecting once: {}",
                source
            );
            Ok(FirstAttempt::Retry)
        }
    }
}

fn exchange_blocking<Ret>(session: &mut BlockingSession, call: &Call<Ret>) -> Result<Ret, RpcError>
where
    Ret: TypeTag + DeserializeOwned,
{
    let frame = match first_attempt(call, session.exchange(call.frame()))? {
        FirstAttempt::Done(frame) => frame,
        FirstAttempt::Retry => {
            session
                .reconnect()
                .map_err(|e| call.transport_error(e))?;
            session
                .exchange(call.frame())
                .map_err(|e| call.exchange_error(e))?
        }
    };
    call.finish(&frame)
}

async fn exchange_async<Ret>(session: &mut AsyncSession, call: &Call<Ret>) -> Result<Ret, RpcError>
where
    Ret: TypeTag + DeserializeOwned,
{
    let frame = match first_attempt(call, session.exchange(call.frame()).await)? {
        FirstAttempt::Done(frame) => frame,
        FirstAttempt::Retry => {
            session
                .reconnect()
                .await
                .map_err(|e| call.transport_error(e))?;
            session
                .exchange(call.frame())
                .await
                .map_err(|e| call.exchange_error(e))?
        }
    };
    call.finish(&frame)
}

/// Blocking stub. Connects on construction.
///
/// # Example
///
/// ```no_run
/// use strandrpc_client::{Client, ClientConfig, Procedure};
///
/// const ADD: Procedure<(i32, i32), i32> = Procedure::function("add");
///
/// let mut client = Client::connect(ClientConfig::new("127.0.0.1", 8080)).unwrap();
/// assert_eq!(client.call(&ADD, &(1, 2)).unwrap(), 3);
/// ```
#[derive(Debug)]
pub struct Client {
    session: BlockingSession,
}

impl Client {
    pub fn connect(config: ClientConfig) -> Result<Self, TransportError> {
        Ok(Self {
            session: BlockingSession::connect(config)?,
        })
    }

    pub fn session(&self) -> &BlockingSession {
        &self.session
    }

    pub fn call<Args, Ret>(
        &mut self,
        procedure: &Procedure<Args, Ret>,
        args: &Args,
    ) -> Result<Ret, RpcError>
    where
        Args: ArgList + Serialize,
        Ret: TypeTag + DeserializeOwned,
    {
        let call = Call::prepare(procedure, args)?;
        exchange_blocking(&mut self.session, &call)
    }

    pub fn close(&mut self) {
        self.session.close();
    }
}

/// Non-blocking stub over a session it owns. Connects on construction.
#[derive(Debug)]
pub struct AsyncClient {
    session: AsyncSession,
}

impl AsyncClient {
    pub async fn connect(config: ClientConfig) -> Result<Self, TransportError> {
        Ok(Self {
            session: AsyncSession::connect(config).await?,
        })
    }

    pub fn session(&self) -> &AsyncSession {
        &self.session
    }

    pub async fn call<Args, Ret>(
        &mut self,
        procedure: &Procedure<Args, Ret>,
        args: &Args,
    ) -> Result<Ret, RpcError>
    where
        Args: ArgList + Serialize,
        Ret: TypeTag + DeserializeOwned,
    {
        let call = Call::prepare(procedure, args)?;
        exchange_async(&mut self.session, &call).await
    }

    pub fn close(&mut self) {
        self.session.close();
    }
}

/// Non-blocking stub that draws sessions from a per-thread pool.
///
/// Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct PooledClient {
    config: ClientConfig,
    pool: OutboundPool,
}

impl PooledClient {
    pub fn new(config: ClientConfig, pool: OutboundPool) -> Self {
        Self { config, pool }
    }

    /// A client with its own pool family.
    pub fn with_pool_config(config: ClientConfig, pool_config: PoolConfig) -> Self {
        Self::new(config, OutboundPool::new(pool_config))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn pool(&self) -> &OutboundPool {
        &self.pool
    }

    /// Performs a call on this thread's pooled session for the destination.
    ///
    /// A failed connect while filling an empty slot is returned without a
    /// retry.
    pub async fn call<Args, Ret>(
        &self,
        procedure: &Procedure<Args, Ret>,
        args: &Args,
    ) -> Result<Ret, RpcError>
    where
        Args: ArgList + Serialize,
        Ret: TypeTag + DeserializeOwned,
    {
        let call = Call::prepare(procedure, args)?;
        let pooled = self
            .pool
            .acquire(&self.config)
            .await
            .map_err(|e| call.transport_error(e))?;
        let mut session = pooled.lock().await;
        exchange_async(&mut session, &call).await
    }
}
