use std::time::Duration;

use strandrpc_common::ProtocolError;
use thiserror::Error;

use crate::connection::Phase;

/// Registration failure. Fatal to startup.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("routing key registered twice: {0}")]
    DuplicateKey(String),
}

/// Why a connection task stopped.
///
/// None of these reach a caller; the client notices on its next attempt.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("{phase} timed out after {after:?}")]
    Timeout { phase: Phase, after: Duration },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{phase} failed: {source}")]
    Io {
        phase: Phase,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
