//! JSON front end for the `call` command.
//!
//! The command line names a procedure of the demonstration service and
//! passes its arguments as a JSON array. The array is decoded into the
//! procedure's argument tuple, the call goes out through a [`Caller`], and
//! the typed result comes back as JSON.

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use strandrpc_client::{Client, PooledClient, RpcError};
use strandrpc_common::{ArgList, Procedure, TypeTag};

use crate::service::*;

/// Something that can perform a typed call.
pub trait Caller {
    fn call<Args, Ret>(
        &mut self,
        procedure: &Procedure<Args, Ret>,
        args: &Args,
    ) -> Result<Ret, RpcError>
    where
        Args: ArgList + Serialize,
        Ret: TypeTag + DeserializeOwned;
}

impl Caller for Client {
    fn call<Args, Ret>(
        &mut self,
        procedure: &Procedure<Args, Ret>,
        args: &Args,
    ) -> Result<Ret, RpcError>
    where
        Args: ArgList + Serialize,
        Ret: TypeTag + DeserializeOwned,
    {
        Client::call(self, procedure, args)
    }
}

/// Drives a [`PooledClient`] from synchronous code on a private runtime.
pub struct BlockingPooledCaller {
    runtime: tokio::runtime::Runtime,
    client: PooledClient,
}

impl BlockingPooledCaller {
    pub fn new(client: PooledClient) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build client runtime")?;
        Ok(Self { runtime, client })
    }
}

impl Caller for BlockingPooledCaller {
    fn call<Args, Ret>(
        &mut self,
        procedure: &Procedure<Args, Ret>,
        args: &Args,
    ) -> Result<Ret, RpcError>
    where
        Args: ArgList + Serialize,
        Ret: TypeTag + DeserializeOwned,
    {
        self.runtime.block_on(self.client.call(procedure, args))
    }
}

/// Names accepted by [`call_json`].
pub const PROCEDURE_NAMES: &[&str] = &[
    "echo",
    "add",
    "add_three",
    "generic_add<i64>",
    "generic_add<f64>",
    "math::add",
    "combine",
    "wait_and_echo",
    "Calculator::add",
    "Calculator::echo",
    "Calculator::calls",
    "Counter::bump",
    "fail",
];

/// Calls the procedure called `name` with a JSON argument array.
pub fn call_json<C: Caller>(caller: &mut C, name: &str, args: Value) -> Result<Value> {
    match name {
        "echo" => invoke(caller, &ECHO, args),
        "add" => invoke(caller, &ADD, args),
        "add_three" => invoke(caller, &ADD_THREE, args),
        "generic_add<i64>" => invoke(caller, &GENERIC_ADD_I64, args),
        "generic_add<f64>" => invoke(caller, &GENERIC_ADD_F64, args),
        "math::add" => invoke(caller, &MATH_ADD, args),
        "combine" => invoke(caller, &COMBINE, args),
        "wait_and_echo" => invoke(caller, &WAIT_AND_ECHO, args),
        "Calculator::add" => invoke(caller, &CALCULATOR_ADD, args),
        "Calculator::echo" => invoke(caller, &CALCULATOR_ECHO, args),
        "Calculator::calls" => invoke(caller, &CALCULATOR_CALLS, args),
        "Counter::bump" => invoke(caller, &COUNTER_BUMP, args),
        "fail" => invoke(caller, &FAIL, args),
        other => Err(anyhow!(
            "unknown procedure '{}', expected one of: {}",
            other,
            PROCEDURE_NAMES.join(", ")
        )),
    }
}

fn invoke<C, Args, Ret>(
    caller: &mut C,
    procedure: &Procedure<Args, Ret>,
    args: Value,
) -> Result<Value>
where
    C: Caller,
    Args: ArgList + Serialize + DeserializeOwned,
    Ret: TypeTag + Serialize + DeserializeOwned,
{
    let args: Args = parse_args(args)
        .with_context(|| format!("arguments do not match {}", procedure.key()))?;
    let ret = caller.call(procedure, &args)?;
    Ok(serde_json::to_value(ret)?)
}

/// Decodes a JSON array into an argument tuple.
///
/// An empty array stands for the empty tuple, which serde otherwise only
/// reads from `null`.
pub fn parse_args<Args: DeserializeOwned>(args: Value) -> serde_json::Result<Args> {
    match args {
        Value::Array(items) if items.is_empty() => serde_json::from_value(Value::Null),
        other => serde_json::from_value(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Answers every call from a canned JSON value.
    struct Canned(Value);

    impl Caller for Canned {
        fn call<Args, Ret>(&mut self, _: &Procedure<Args, Ret>, _: &Args) -> Result<Ret, RpcError>
        where
            Args: ArgList + Serialize,
            Ret: TypeTag + DeserializeOwned,
        {
            Ok(serde_json::from_value(self.0.clone()).unwrap())
        }
    }

    #[test]
    fn test_parse_args_tuples() {
        let (a, b): (i32, i32) = parse_args(json!([1, 2])).unwrap();
        assert_eq!((a, b), (1, 2));

        let (s,): (String,) = parse_args(json!(["hi"])).unwrap();
        assert_eq!(s, "hi");

        let () = parse_args(json!([])).unwrap();
        let () = parse_args(Value::Null).unwrap();
    }

    #[test]
    fn test_parse_args_structs() {
        let (left, right): (Combined, Combined) = parse_args(json!([
            {"label": "a", "value": 1},
            {"label": "b", "value": 2}
        ]))
        .unwrap();
        assert_eq!(left.label, "a");
        assert_eq!(right.value, 2);
    }

    #[test]
    fn test_parse_args_wrong_arity() {
        assert!(parse_args::<(i32, i32)>(json!([1])).is_err());
        assert!(parse_args::<(i32,)>(json!(["x"])).is_err());
    }

    #[test]
    fn test_call_json_routes_by_name() {
        let mut caller = Canned(json!(5));
        assert_eq!(call_json(&mut caller, "add", json!([2, 3])).unwrap(), json!(5));
    }

    #[test]
    fn test_call_json_unknown_name() {
        let mut caller = Canned(Value::Null);
        let err = call_json(&mut caller, "nope", json!([])).unwrap_err();
        assert!(err.to_string().contains("unknown procedure 'nope'"));
    }

    #[test]
    fn test_call_json_bad_arguments() {
        let mut caller = Canned(Value::Null);
        let err = call_json(&mut caller, "add", json!(["a", "b"])).unwrap_err();
        assert!(err.to_string().contains("add--fn(i32, i32) -> i32"));
    }
}
