//! The demonstration service.
//!
//! Covers every handler shape the server supports: free functions,
//! namespaced functions, two instantiations of one generic function, struct
//! arguments, a suspending function, methods on a process-wide instance and
//! on a per-thread instance, and a function that always fails.

use std::cell::Cell;
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strandrpc_common::{type_tag, Procedure};
use strandrpc_server::{PerThread, Registry, RegistryBuilder, RegistryError, Shared};

pub const ECHO: Procedure<(String,), String> = Procedure::function("echo");
pub const ADD: Procedure<(i32, i32), i32> = Procedure::function("add");
pub const ADD_THREE: Procedure<(i32, i32, i32), i32> = Procedure::function("add_three");
pub const GENERIC_ADD_I64: Procedure<(i64, i64), i64> = Procedure::function("generic_add");
pub const GENERIC_ADD_F64: Procedure<(f64, f64), f64> = Procedure::function("generic_add");
pub const MATH_ADD: Procedure<(i32, i32), i32> = Procedure::function("math::add");
pub const COMBINE: Procedure<(Combined, Combined), Combined> = Procedure::function("combine");
pub const WAIT_AND_ECHO: Procedure<(i32,), i32> = Procedure::function("wait_and_echo");
pub const CALCULATOR_ADD: Procedure<(i32, i32), i32> = Procedure::method("Calculator", "add");
pub const CALCULATOR_ECHO: Procedure<(String,), String> = Procedure::method("Calculator", "echo");
pub const CALCULATOR_CALLS: Procedure<(), u64> = Procedure::method("Calculator", "calls");
pub const COUNTER_BUMP: Procedure<(), u64> = Procedure::method("Counter", "bump");
pub const FAIL: Procedure<(), ()> = Procedure::function("fail");

/// Default delay of `wait_and_echo`.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combined {
    pub label: String,
    pub value: i64,
}

type_tag!(Combined);

/// Process-wide calculator that counts the calls it serves.
#[derive(Debug, Default)]
pub struct Calculator {
    calls: AtomicU64,
}

impl Calculator {
    pub fn add(&self, a: i32, b: i32) -> i32 {
        self.calls.fetch_add(1, Ordering::Relaxed);
        a + b
    }

    pub fn echo(&self, s: String) -> String {
        self.calls.fetch_add(1, Ordering::Relaxed);
        s
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

/// Per-worker counter. Each worker thread sees its own count.
#[derive(Debug, Default)]
pub struct Counter {
    count: Cell<u64>,
}

impl Counter {
    pub fn bump(&self) -> u64 {
        let next = self.count.get() + 1;
        self.count.set(next);
        next
    }
}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub wait: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self { wait: DEFAULT_WAIT }
    }
}

pub fn generic_add<T: Add<Output = T>>(a: T, b: T) -> T {
    a + b
}

pub fn combine(left: Combined, right: Combined) -> Combined {
    Combined {
        label: left.label + &right.label,
        value: left.value + right.value,
    }
}

async fn wait_and_echo(wait: Duration, value: i32) -> anyhow::Result<i32> {
    tokio::time::sleep(wait).await;
    Ok(value)
}

/// Registers every procedure of the service.
pub fn register(
    builder: &mut RegistryBuilder,
    options: &ServiceOptions,
) -> Result<(), RegistryError> {
    let calculator = Shared::from_arc(Arc::new(Calculator::default()));
    let counter = PerThread::<Counter>::default();
    let wait = options.wait;

    builder
        .function(&ECHO, |(s,)| Ok(s))?
        .function(&ADD, |(a, b)| Ok(a + b))?
        .function(&ADD_THREE, |(a, b, c)| Ok(a + b + c))?
        .function(&GENERIC_ADD_I64, |(a, b)| Ok(generic_add(a, b)))?
        .function(&GENERIC_ADD_F64, |(a, b)| Ok(generic_add(a, b)))?
        .function(&MATH_ADD, |(a, b)| Ok(a + b))?
        .function(&COMBINE, |(left, right)| Ok(combine(left, right)))?
        .suspending_function(&WAIT_AND_ECHO, move |(value,)| wait_and_echo(wait, value))?
        .method(&CALCULATOR_ADD, calculator.clone(), |c: &Calculator, (a, b)| {
            Ok(c.add(a, b))
        })?
        .method(&CALCULATOR_ECHO, calculator.clone(), |c: &Calculator, (s,)| {
            Ok(c.echo(s))
        })?
        .method(&CALCULATOR_CALLS, calculator, |c: &Calculator, ()| Ok(c.calls()))?
        .method(&COUNTER_BUMP, counter, |c: &Counter, ()| Ok(c.bump()))?
        .function(&FAIL, |()| -> anyhow::Result<()> {
            anyhow::bail!("fail always fails")
        })?;

    Ok(())
}

/// Builds a registry holding only the demonstration service.
pub fn registry(options: &ServiceOptions) -> Result<Registry, RegistryError> {
    let mut builder = Registry::builder();
    register(&mut builder, options)?;
    Ok(builder.build())
}
