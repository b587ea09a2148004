//! Request and response envelopes.
//!
//! Field order is the codec order on the wire:
//!
//! - `Request`: `routing_key: string`, `payload: bytes`
//! - `Response`: `status: int32`, `payload: bytes`

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// A call to one registered handler.
///
/// `payload` is a frame holding the encoded argument tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub routing_key: String,
    pub payload: Vec<u8>,
}

impl Request {
    pub fn new(routing_key: impl Into<String>, payload: Vec<u8>) -> Self {
        Request {
            routing_key: routing_key.into(),
            payload,
        }
    }
}

/// Outcome code of a call, sent as an `i32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Status {
    Success,
    NotFound,
    ServerException,
}

impl Status {
    pub fn code(self) -> i32 {
        match self {
            Status::Success => 0,
            Status::NotFound => 1,
            Status::ServerException => 2,
        }
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

impl TryFrom<i32> for Status {
    type Error = ProtocolError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Status::Success),
            1 => Ok(Status::NotFound),
            2 => Ok(Status::ServerException),
            other => Err(ProtocolError::UnknownStatus(other)),
        }
    }
}

/// Reply to a [`Request`].
///
/// On `Success`, `payload` is a frame holding the encoded return value;
/// otherwise it is empty. Server-side failure detail never travels here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub payload: Vec<u8>,
}

impl Response {
    pub fn success(payload: Vec<u8>) -> Self {
        Response {
            status: Status::Success,
            payload,
        }
    }

    pub fn not_found() -> Self {
        Response {
            status: Status::NotFound,
            payload: Vec::new(),
        }
    }

    pub fn server_exception() -> Self {
        Response {
            status: Status::ServerException,
            payload: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}
