//! Instance providers for method handlers.
//!
//! A method handler needs a receiver. Rather than looking one up in a
//! global, the registration call captures a provider:
//!
//! - [`Shared`] hands every worker thread the same instance. The instance
//!   must be `Send + Sync` and does its own synchronisation.
//! - [`PerThread`] lazily builds one instance per worker thread.
//!
//! Suspending methods may resume on a different worker than the one they
//! started on, so they only accept a [`SharedProvider`]. `PerThread` does not
//! implement it, which turns that mistake into a compile error.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lends an instance of `T` for the duration of one call.
pub trait InstanceProvider<T>: Send + Sync + 'static {
    fn with_instance<R>(&self, f: impl FnOnce(&T) -> R) -> R;
}

/// A provider whose instance is process-wide and can be held across awaits.
pub trait SharedProvider<T>: InstanceProvider<T> {
    fn instance(&self) -> Arc<T>;
}

/// Process-wide singleton.
pub struct Shared<T> {
    instance: Arc<T>,
}

impl<T: Send + Sync + 'static> Shared<T> {
    pub fn new(instance: T) -> Self {
        Self::from_arc(Arc::new(instance))
    }

    pub fn from_arc(instance: Arc<T>) -> Self {
        Shared { instance }
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared {
            instance: Arc::clone(&self.instance),
        }
    }
}

impl<T: Send + Sync + 'static> InstanceProvider<T> for Shared<T> {
    fn with_instance<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.instance)
    }
}

impl<T: Send + Sync + 'static> SharedProvider<T> for Shared<T> {
    fn instance(&self) -> Arc<T> {
        Arc::clone(&self.instance)
    }
}

static NEXT_PROVIDER_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static THREAD_INSTANCES: RefCell<HashMap<u64, Rc<dyn Any>>> = RefCell::new(HashMap::new());
}

/// One instance per worker thread, built on first use by `init`.
///
/// `T` need not be `Send` or `Sync`; it never leaves the thread that built it.
pub struct PerThread<T> {
    id: u64,
    init: Arc<dyn Fn() -> T + Send + Sync>,
}

impl<T: 'static> PerThread<T> {
    pub fn new(init: impl Fn() -> T + Send + Sync + 'static) -> Self {
        PerThread {
            id: NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed),
            init: Arc::new(init),
        }
    }

    fn current(&self) -> Rc<T> {
        let existing = THREAD_INSTANCES.with(|slots| slots.borrow().get(&self.id).cloned());
        if let Some(instance) = existing.and_then(|any| any.downcast::<T>().ok()) {
            return instance;
        }

        // Built outside the borrow so `init` may itself use other providers.
        let instance = Rc::new((self.init)());
        THREAD_INSTANCES.with(|slots| {
            slots
                .borrow_mut()
                .insert(self.id, instance.clone() as Rc<dyn Any>)
        });
        instance
    }
}

impl<T: Default + 'static> Default for PerThread<T> {
    fn default() -> Self {
        Self::new(T::default)
    }
}

impl<T> Clone for PerThread<T> {
    fn clone(&self) -> Self {
        PerThread {
            id: self.id,
            init: Arc::clone(&self.init),
        }
    }
}

impl<T: 'static> InstanceProvider<T> for PerThread<T> {
    fn with_instance<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let instance = self.current();
        f(&instance)
    }
}
