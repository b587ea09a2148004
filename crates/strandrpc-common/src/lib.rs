//! StrandRPC Common Types and Wire Protocol
//!
//! This crate provides the pieces that clients and servers must agree on
//! byte-for-byte without a handshake:
//!
//! - **Frame Codec**: `[8-byte little-endian body length] + [postcard body]`
//! - **Envelopes**: [`Request`] and [`Response`] with a [`Status`] code
//! - **Routing Keys**: deterministic `<name>--<signature>` strings derived
//!   from a shared [`Procedure`] declaration
//! - **Errors**: the protocol / transport / RPC error taxonomy
//!
//! # Example
//!
//! ```
//! use strandrpc_common::{frame, Procedure, Request};
//!
//! const ADD: Procedure<(i32, i32), i32> = Procedure::function("add");
//! assert_eq!(ADD.key(), "add--fn(i32, i32) -> i32");
//!
//! let payload = frame::encode(&(1i32, 2i32)).unwrap();
//! let request = Request::new(ADD.key(), payload);
//! let bytes = frame::encode(&request).unwrap();
//! assert_eq!(frame::decode::<Request>(&bytes).unwrap(), request);
//! ```

pub mod call;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod routing;

pub use call::Call;
pub use error::{ErrorKind, ExchangeError, ProtocolError, RpcError, TransportError};
pub use protocol::{Request, Response, Status};
pub use routing::{ArgList, Procedure, TypeTag, KEY_SEPARATOR};
