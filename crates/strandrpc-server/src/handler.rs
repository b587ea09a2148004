//! Type-erased handler adapters.
//!
//! Every registered function, whatever its argument and return types, is
//! wrapped into one of two uniform shapes:
//!
//! - [`ImmediateHandler`]: `payload -> result payload`
//! - [`SuspendingHandler`]: `payload -> future of result payload`
//!
//! The adapters decode the argument tuple from the request payload, call the
//! function (binding an instance for methods), and encode the return value.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use strandrpc_common::frame;

use crate::instance::{InstanceProvider, SharedProvider};

/// Whether a handler produces its result synchronously or may suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Immediate,
    Suspending,
}

pub trait ImmediateHandler: Send + Sync + 'static {
    fn invoke(&self, payload: &[u8]) -> anyhow::Result<Vec<u8>>;
}

pub trait SuspendingHandler: Send + Sync + 'static {
    fn invoke(&self, payload: Vec<u8>) -> BoxFuture<'static, anyhow::Result<Vec<u8>>>;
}

pub(crate) struct FunctionAdapter<Args, Ret, F> {
    func: F,
    _signature: PhantomData<fn(Args) -> Ret>,
}

impl<Args, Ret, F> FunctionAdapter<Args, Ret, F> {
    pub(crate) fn new(func: F) -> Self {
        FunctionAdapter {
            func,
            _signature: PhantomData,
        }
    }
}

impl<Args, Ret, F> ImmediateHandler for FunctionAdapter<Args, Ret, F>
where
    Args: DeserializeOwned + 'static,
    Ret: Serialize + 'static,
    F: Fn(Args) -> anyhow::Result<Ret> + Send + Sync + 'static,
{
    fn invoke(&self, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
        let args: Args = frame::decode(payload)?;
        let ret = (self.func)(args)?;
        Ok(frame::encode(&ret)?)
    }
}

pub(crate) struct MethodAdapter<T, P, Args, Ret, F> {
    provider: P,
    method: F,
    _signature: PhantomData<fn(&T, Args) -> Ret>,
}

impl<T, P, Args, Ret, F> MethodAdapter<T, P, Args, Ret, F> {
    pub(crate) fn new(provider: P, method: F) -> Self {
        MethodAdapter {
            provider,
            method,
            _signature: PhantomData,
        }
    }
}

impl<T, P, Args, Ret, F> ImmediateHandler for MethodAdapter<T, P, Args, Ret, F>
where
    T: 'static,
    P: InstanceProvider<T>,
    Args: DeserializeOwned + 'static,
    Ret: Serialize + 'static,
    F: Fn(&T, Args) -> anyhow::Result<Ret> + Send + Sync + 'static,
{
    fn invoke(&self, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
        let args: Args = frame::decode(payload)?;
        let ret = self
            .provider
            .with_instance(|instance| (self.method)(instance, args))?;
        Ok(frame::encode(&ret)?)
    }
}

pub(crate) struct AsyncFunctionAdapter<Args, Ret, F> {
    func: F,
    _signature: PhantomData<fn(Args) -> Ret>,
}

impl<Args, Ret, F> AsyncFunctionAdapter<Args, Ret, F> {
    pub(crate) fn new(func: F) -> Self {
        AsyncFunctionAdapter {
            func,
            _signature: PhantomData,
        }
    }
}

impl<Args, Ret, F, Fut> SuspendingHandler for AsyncFunctionAdapter<Args, Ret, F>
where
    Args: DeserializeOwned + 'static,
    Ret: Serialize + Send + 'static,
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Ret>> + Send + 'static,
{
    fn invoke(&self, payload: Vec<u8>) -> BoxFuture<'static, anyhow::Result<Vec<u8>>> {
        let args: Args = match frame::decode(&payload) {
            Ok(args) => args,
            Err(e) => return future::ready(Err(e.into())).boxed(),
        };
        let pending = (self.func)(args);
        async move {
            let ret = pending.await?;
            Ok(frame::encode(&ret)?)
        }
        .boxed()
    }
}

pub(crate) struct AsyncMethodAdapter<T, P, Args, Ret, F> {
    provider: P,
    method: F,
    _signature: PhantomData<fn(Arc<T>, Args) -> Ret>,
}

impl<T, P, Args, Ret, F> AsyncMethodAdapter<T, P, Args, Ret, F> {
    pub(crate) fn new(provider: P, method: F) -> Self {
        AsyncMethodAdapter {
            provider,
            method,
            _signature: PhantomData,
        }
    }
}

impl<T, P, Args, Ret, F, Fut> SuspendingHandler for AsyncMethodAdapter<T, P, Args, Ret, F>
where
    T: Send + Sync + 'static,
    P: SharedProvider<T>,
    Args: DeserializeOwned + 'static,
    Ret: Serialize + Send + 'static,
    F: Fn(Arc<T>, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Ret>> + Send + 'static,
{
    fn invoke(&self, payload: Vec<u8>) -> BoxFuture<'static, anyhow::Result<Vec<u8>>> {
        let args: Args = match frame::decode(&payload) {
            Ok(args) => args,
            Err(e) => return future::ready(Err(e.into())).boxed(),
        };
        let pending = (self.method)(self.provider.instance(), args);
        async move {
            let ret = pending.await?;
            Ok(frame::encode(&ret)?)
        }
        .boxed()
    }
}
