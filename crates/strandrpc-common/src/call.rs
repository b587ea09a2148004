//! Encoding and decoding for one client call.
//!
//! Both the blocking and the non-blocking stubs go through [`Call`], so the
//! only thing that differs between them is how the request frame travels.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ExchangeError, ProtocolError, RpcError, TransportError};
use crate::frame;
use crate::protocol::{Request, Response, Status};
use crate::routing::{ArgList, Procedure, TypeTag};

/// A prepared call: the routing key plus the encoded request frame.
#[derive(Debug)]
pub struct Call<Ret> {
    routing_key: String,
    frame: Vec<u8>,
    _ret: PhantomData<fn() -> Ret>,
}

impl<Ret> Call<Ret>
where
    Ret: TypeTag + DeserializeOwned,
{
    /// Encodes `args` for `procedure` into a request frame.
    pub fn prepare<Args>(procedure: &Procedure<Args, Ret>, args: &Args) -> Result<Self, RpcError>
    where
        Args: ArgList + Serialize,
    {
        let routing_key = procedure.key();
        let encoded = frame::encode(args)
            .and_then(|payload| frame::encode(&Request::new(routing_key.clone(), payload)));

        match encoded {
            Ok(frame) => Ok(Call {
                routing_key,
                frame,
                _ret: PhantomData,
            }),
            Err(source) => Err(RpcError::Protocol {
                routing_key,
                source,
            }),
        }
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// The complete request frame to write to the session.
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    /// Decodes a complete response frame into the return value.
    pub fn finish(&self, response_frame: &[u8]) -> Result<Ret, RpcError> {
        let response: Response =
            frame::decode(response_frame).map_err(|e| self.protocol_error(e))?;

        match response.status {
            Status::Success => frame::decode(&response.payload).map_err(|e| self.protocol_error(e)),
            Status::NotFound => Err(RpcError::NotFound {
                routing_key: self.routing_key.clone(),
            }),
            Status::ServerException => Err(RpcError::ServerException {
                routing_key: self.routing_key.clone(),
            }),
        }
    }

    pub fn protocol_error(&self, source: ProtocolError) -> RpcError {
        RpcError::Protocol {
            routing_key: self.routing_key.clone(),
            source,
        }
    }

    pub fn transport_error(&self, source: TransportError) -> RpcError {
        RpcError::Transport {
            routing_key: self.routing_key.clone(),
            source,
        }
    }

    pub fn exchange_error(&self, err: ExchangeError) -> RpcError {
        match err {
            ExchangeError::Transport(source) => self.transport_error(source),
            ExchangeError::Protocol(source) => self.protocol_error(source),
        }
    }
}
