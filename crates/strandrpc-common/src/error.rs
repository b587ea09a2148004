use thiserror::Error;

/// Malformed or undecodable bytes on the wire.
///
/// Always fatal to the connection that produced it; never retried.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("frame too short: {0} bytes, header needs 8")]
    FrameTooShort(usize),

    #[error("frame length mismatch: header declares {declared} bytes, {actual} present")]
    LengthMismatch { declared: u64, actual: u64 },

    #[error("frame too large: {declared} bytes (max {max} bytes)")]
    FrameTooLarge { declared: u64, max: u64 },

    #[error("{0} trailing bytes after decoded value")]
    TrailingBytes(usize),

    #[error("encode error: {0}")]
    Encode(#[source] postcard::Error),

    #[error("decode error: {0}")]
    Decode(#[source] postcard::Error),

    #[error("unknown response status {0}")]
    UnknownStatus(i32),
}

/// Connect, send or receive failure on a client session.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to connect to {destination}: {source}")]
    Connect {
        destination: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection closed by peer")]
    Closed,

    #[error("session is not connected")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Folds the EOF flavours of IO errors into [`TransportError::Closed`].
    pub fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => TransportError::Closed,
            _ => TransportError::Io(err),
        }
    }
}

/// Failure of one request/response exchange on a session.
///
/// Only the `Transport` side is eligible for the reconnect-and-retry path.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Which entry of the error taxonomy a failed call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Protocol,
    NotFound,
    ServerException,
    Transport,
}

/// Error returned to the caller of a remote procedure.
///
/// Every variant names the routing key of the failed call.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("protocol error calling `{routing_key}`: {source}")]
    Protocol {
        routing_key: String,
        #[source]
        source: ProtocolError,
    },

    #[error("no handler registered for `{routing_key}`")]
    NotFound { routing_key: String },

    #[error("handler for `{routing_key}` failed on the server")]
    ServerException { routing_key: String },

    #[error("transport error calling `{routing_key}`: {source}")]
    Transport {
        routing_key: String,
        #[source]
        source: TransportError,
    },
}

impl RpcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::Protocol { .. } => ErrorKind::Protocol,
            RpcError::NotFound { .. } => ErrorKind::NotFound,
            RpcError::ServerException { .. } => ErrorKind::ServerException,
            RpcError::Transport { .. } => ErrorKind::Transport,
        }
    }

    pub fn routing_key(&self) -> &str {
        match self {
            RpcError::Protocol { routing_key, .. }
            | RpcError::NotFound { routing_key }
            | RpcError::ServerException { routing_key }
            | RpcError::Transport { routing_key, .. } => routing_key,
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
