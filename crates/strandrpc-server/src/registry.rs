//! Handler registry and request dispatch.
//!
//! Registration happens once, before the listener starts, through a
//! [`RegistryBuilder`]. [`RegistryBuilder::build`] freezes the tables into a
//! [`Registry`] that worker tasks share read-only behind an `Arc`.
//!
//! Immediate and suspending handlers live in separate tables. A routing key
//! may appear in only one of them; registering it twice is an error.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use strandrpc_common::{ArgList, Procedure, Request, Response, TypeTag};

use crate::error::RegistryError;
use crate::handler::{
    AsyncFunctionAdapter, AsyncMethodAdapter, FunctionAdapter, HandlerKind, ImmediateHandler,
    MethodAdapter, SuspendingHandler,
};
use crate::instance::{InstanceProvider, SharedProvider};

/// A type-erased handler of either kind.
pub enum HandlerEntry {
    Immediate(Box<dyn ImmediateHandler>),
    Suspending(Box<dyn SuspendingHandler>),
}

impl HandlerEntry {
    pub fn kind(&self) -> HandlerKind {
        match self {
            HandlerEntry::Immediate(_) => HandlerKind::Immediate,
            HandlerEntry::Suspending(_) => HandlerKind::Suspending,
        }
    }
}

/// Collects handlers before the server starts.
#[derive(Default)]
pub struct RegistryBuilder {
    immediate: HashMap<String, Box<dyn ImmediateHandler>>,
    suspending: HashMap<String, Box<dyn SuspendingHandler>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type-erased handler under an explicit routing key.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateKey`] if `routing_key` is already
    /// present in either table.
    pub fn register(
        &mut self,
        routing_key: impl Into<String>,
        entry: HandlerEntry,
    ) -> Result<&mut Self, RegistryError> {
        let routing_key = routing_key.into();
        if self.contains(&routing_key) {
            return Err(RegistryError::DuplicateKey(routing_key));
        }

        tracing::info!(routing_key = %routing_key, kind = ?entry.kind(), "Registered handler");
        match entry {
            HandlerEntry::Immediate(handler) => {
                self.immediate.insert(routing_key, handler);
            }
            HandlerEntry::Suspending(handler) => {
                self.suspending.insert(routing_key, handler);
            }
        }
        Ok(self)
    }

    /// Registers a function that completes without suspending.
    pub fn function<Args, Ret, F>(
        &mut self,
        procedure: &Procedure<Args, Ret>,
        func: F,
    ) -> Result<&mut Self, RegistryError>
    where
        Args: ArgList + DeserializeOwned + 'static,
        Ret: TypeTag + Serialize + 'static,
        F: Fn(Args) -> anyhow::Result<Ret> + Send + Sync + 'static,
    {
        let handler = FunctionAdapter::new(func);
        self.register(procedure.key(), HandlerEntry::Immediate(Box::new(handler)))
    }

    /// Registers a function that may suspend its worker while it waits.
    pub fn suspending_function<Args, Ret, F, Fut>(
        &mut self,
        procedure: &Procedure<Args, Ret>,
        func: F,
    ) -> Result<&mut Self, RegistryError>
    where
        Args: ArgList + DeserializeOwned + 'static,
        Ret: TypeTag + Serialize + Send + 'static,
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Ret>> + Send + 'static,
    {
        let handler = AsyncFunctionAdapter::new(func);
        self.register(procedure.key(), HandlerEntry::Suspending(Box::new(handler)))
    }

    /// Registers a method whose receiver comes from `provider`.
    pub fn method<T, P, Args, Ret, F>(
        &mut self,
        procedure: &Procedure<Args, Ret>,
        provider: P,
        method: F,
    ) -> Result<&mut Self, RegistryError>
    where
        T: 'static,
        P: InstanceProvider<T>,
        Args: ArgList + DeserializeOwned + 'static,
        Ret: TypeTag + Serialize + 'static,
        F: Fn(&T, Args) -> anyhow::Result<Ret> + Send + Sync + 'static,
    {
        let handler = MethodAdapter::new(provider, method);
        self.register(procedure.key(), HandlerEntry::Immediate(Box::new(handler)))
    }

    /// Registers a suspending method. Only process-wide instances qualify.
    pub fn suspending_method<T, P, Args, Ret, F, Fut>(
        &mut self,
        procedure: &Procedure<Args, Ret>,
        provider: P,
        method: F,
    ) -> Result<&mut Self, RegistryError>
    where
        T: Send + Sync + 'static,
        P: SharedProvider<T>,
        Args: ArgList + DeserializeOwned + 'static,
        Ret: TypeTag + Serialize + Send + 'static,
        F: Fn(Arc<T>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Ret>> + Send + 'static,
    {
        let handler = AsyncMethodAdapter::new(provider, method);
        self.register(procedure.key(), HandlerEntry::Suspending(Box::new(handler)))
    }

    pub fn contains(&self, routing_key: &str) -> bool {
        self.immediate.contains_key(routing_key) || self.suspending.contains_key(routing_key)
    }

    pub fn build(self) -> Registry {
        tracing::debug!(
            immediate = self.immediate.len(),
            suspending = self.suspending.len(),
            "Registry frozen"
        );
        Registry {
            immediate: self.immediate,
            suspending: self.suspending,
        }
    }
}

/// Immutable routing-key to handler tables.
pub struct Registry {
    immediate: HashMap<String, Box<dyn ImmediateHandler>>,
    suspending: HashMap<String, Box<dyn SuspendingHandler>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Runs the handler registered for `request.routing_key`.
    ///
    /// Never fails: an unknown key becomes `NotFound`, and a handler that
    /// returns an error, rejects its argument payload, or panics becomes
    /// `ServerException`. The suspending table is consulted first.
    pub async fn dispatch(&self, request: Request) -> Response {
        let Request {
            routing_key,
            payload,
        } = request;

        let outcome = if let Some(handler) = self.suspending.get(&routing_key) {
            AssertUnwindSafe(async move { handler.invoke(payload).await })
                .catch_unwind()
                .await
        } else if let Some(handler) = self.immediate.get(&routing_key) {
            std::panic::catch_unwind(AssertUnwindSafe(|| handler.invoke(&payload)))
        } else {
            tracing::warn!(routing_key = %routing_key, "No handler registered");
            return Response::not_found();
        };

        match outcome {
            Ok(Ok(payload)) => Response::success(payload),
            Ok(Err(e)) => {
                tracing::error!(routing_key = %routing_key, "Handler failed: {:#}", e);
                Response::server_exception()
            }
            Err(_) => {
                tracing::error!(routing_key = %routing_key, "Handler panicked");
                Response::server_exception()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.immediate.len() + self.suspending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, routing_key: &str) -> bool {
        self.kind_of(routing_key).is_some()
    }

    pub fn kind_of(&self, routing_key: &str) -> Option<HandlerKind> {
        if self.suspending.contains_key(routing_key) {
            Some(HandlerKind::Suspending)
        } else if self.immediate.contains_key(routing_key) {
            Some(HandlerKind::Immediate)
        } else {
            None
        }
    }

    /// All registered routing keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .immediate
            .keys()
            .chain(self.suspending.keys())
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{PerThread, Shared};
    use std::cell::Cell;
    use std::time::Duration;
    use strandrpc_common::{frame, Status};

    const ECHO: Procedure<(String,), String> = Procedure::function("echo");
    const ADD: Procedure<(i32, i32), i32> = Procedure::function("add");
    const FAIL: Procedure<(), ()> = Procedure::function("fail");
    const BOOM: Procedure<(), ()> = Procedure::function("boom");
    const WAIT: Procedure<(u64,), u64> = Procedure::function("wait");
    const BUMP: Procedure<(), u64> = Procedure::method("Counter", "bump");
    const SCALE: Procedure<(i64,), i64> = Procedure::method("Scaler", "scale");

    async fn wait(millis: u64) -> anyhow::Result<u64> {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(millis)
    }

    fn registry() -> Registry {
        let mut builder = Registry::builder();
        builder
            .function(&ECHO, |(s,)| Ok(s))
            .unwrap()
            .function(&ADD, |(a, b)| Ok(a + b))
            .unwrap()
            .function(&FAIL, |()| Err(anyhow::anyhow!("always fails")))
            .unwrap()
            .function(&BOOM, |()| panic!("handler blew up"))
            .unwrap()
            .suspending_function(&WAIT, |(millis,)| wait(millis))
            .unwrap();
        builder.build()
    }

    fn request<Args, Ret>(procedure: &Procedure<Args, Ret>, args: &Args) -> Request
    where
        Args: ArgList + Serialize,
        Ret: TypeTag,
    {
        Request::new(procedure.key(), frame::encode(args).unwrap())
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let registry = registry();
        let response = registry.dispatch(request(&ADD, &(2, 3))).await;
        assert_eq!(response.status, Status::Success);
        assert_eq!(frame::decode::<i32>(&response.payload).unwrap(), 5);
    }

    #[tokio::test]
    async fn test_dispatch_suspending_handler() {
        let registry = registry();
        let response = registry.dispatch(request(&WAIT, &(5,))).await;
        assert_eq!(response.status, Status::Success);
        assert_eq!(frame::decode::<u64>(&response.payload).unwrap(), 5);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_key_is_not_found() {
        let registry = registry();
        let response = registry
            .dispatch(Request::new("nope--fn() -> ()", frame::encode(&()).unwrap()))
            .await;
        assert_eq!(response.status, Status::NotFound);
        assert!(response.payload.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_same_name_other_signature_is_not_found() {
        let registry = registry();
        let add_i64: Procedure<(i64, i64), i64> = Procedure::function("add");
        let response = registry.dispatch(request(&add_i64, &(2, 3))).await;
        assert_eq!(response.status, Status::NotFound);
    }

    #[tokio::test]
    async fn test_dispatch_handler_error_is_server_exception() {
        let registry = registry();
        let response = registry.dispatch(request(&FAIL, &())).await;
        assert_eq!(response.status, Status::ServerException);
        assert!(response.payload.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_panic_is_server_exception() {
        let registry = registry();
        let response = registry.dispatch(request(&BOOM, &())).await;
        assert_eq!(response.status, Status::ServerException);

        // The registry is still usable afterwards.
        let response = registry.dispatch(request(&ECHO, &("ok".to_string(),))).await;
        assert_eq!(response.status, Status::Success);
    }

    #[tokio::test]
    async fn test_dispatch_bad_arguments_is_server_exception() {
        let registry = registry();
        let response = registry
            .dispatch(Request::new(ADD.key(), vec![1, 2, 3]))
            .await;
        assert_eq!(response.status, Status::ServerException);
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let mut builder = Registry::builder();
        builder.function(&ECHO, |(s,)| Ok(s)).unwrap();
        let err = builder
            .suspending_function(&ECHO, |(s,): (String,)| async move { anyhow::Ok(s) })
            .err()
            .unwrap();
        assert_eq!(err, RegistryError::DuplicateKey(ECHO.key()));
    }

    #[test]
    fn test_introspection() {
        let registry = registry();
        assert_eq!(registry.len(), 5);
        assert!(!registry.is_empty());
        assert!(registry.contains(&ECHO.key()));
        assert_eq!(registry.kind_of(&WAIT.key()), Some(HandlerKind::Suspending));
        assert_eq!(registry.kind_of(&ADD.key()), Some(HandlerKind::Immediate));
        assert_eq!(registry.kind_of("missing"), None);

        let keys = registry.keys();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(keys.len(), 5);
    }

    #[tokio::test]
    async fn test_methods_with_providers() {
        let mut builder = Registry::builder();
        builder
            .method(&BUMP, PerThread::new(|| Cell::new(0u64)), |c: &Cell<u64>, ()| {
                c.set(c.get() + 1);
                Ok(c.get())
            })
            .unwrap()
            .suspending_method(&SCALE, Shared::new(10i64), |factor: Arc<i64>, (n,)| async move {
                anyhow::Ok(*factor * n)
            })
            .unwrap();
        let registry = builder.build();

        registry.dispatch(request(&BUMP, &())).await;
        let response = registry.dispatch(request(&BUMP, &())).await;
        assert_eq!(frame::decode::<u64>(&response.payload).unwrap(), 2);

        let response = registry.dispatch(request(&SCALE, &(4,))).await;
        assert_eq!(frame::decode::<i64>(&response.payload).unwrap(), 40);
    }
}
