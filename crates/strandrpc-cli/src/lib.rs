//! # StrandRPC CLI
//!
//! Library half of the `strandrpc` binary.
//!
//! - [`service`]: the demonstration service and its procedure declarations
//! - [`invoke`]: JSON front end used by `strandrpc call`
//! - [`settings`]: flag and environment resolution for `strandrpc serve`
//!
//! ## Key Commands
//!
//! - `strandrpc serve`: serve the demonstration service
//! - `strandrpc call`: call one procedure and print the result as JSON
//! - `strandrpc list`: print the routing keys the service registers

pub mod invoke;
pub mod service;
pub mod settings;
