//! Transport sessions.
//!
//! A session owns at most one socket to one destination and knows how to
//! (re)connect it. [`BlockingSession`] uses `std::net` and occupies the
//! calling thread for the whole exchange; [`AsyncSession`] uses tokio and
//! suspends at connect, send and receive.
//!
//! Both follow the same reading protocol: write the request frame, read the
//! 8-byte header, read exactly the declared body, return the whole frame. A
//! failed exchange drops the socket, so the next exchange reports
//! [`TransportError::NotConnected`] until the session is reconnected.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};

use strandrpc_common::frame::{self, HEADER_LEN};
use strandrpc_common::{ExchangeError, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::config::ClientConfig;

/// A session driven from a plain OS thread.
#[derive(Debug)]
pub struct BlockingSession {
    config: ClientConfig,
    stream: Option<TcpStream>,
}

impl BlockingSession {
    /// Creates a session without connecting it.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    /// Creates a session and connects it.
    pub fn connect(config: ClientConfig) -> Result<Self, TransportError> {
        let mut session = Self::new(config);
        session.reconnect()?;
        Ok(session)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Drops any existing socket and connects a fresh one.
    ///
    /// Every resolved address is tried in turn.
    pub fn reconnect(&mut self) -> Result<(), TransportError> {
        self.close();

        let destination = self.config.destination();
        let connect_err = |source| TransportError::Connect {
            destination: destination.clone(),
            source,
        };

        let addrs = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()
            .map_err(connect_err)?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.config.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    tracing::debug!(destination = %destination, peer = %addr, "Connected");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(connect_err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")
        })))
    }

    /// Sends one request frame and returns the complete response frame.
    pub fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, ExchangeError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let result = round_trip(stream, request, self.config.max_frame_size);
        if result.is_err() {
            self.close();
        }
        result
    }

    /// Shuts the socket down. Safe to call when not connected.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl Drop for BlockingSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn round_trip(
    stream: &mut TcpStream,
    request: &[u8],
    max_frame_size: u64,
) -> Result<Vec<u8>, ExchangeError> {
    stream.write_all(request).map_err(TransportError::from_io)?;
    stream.flush().map_err(TransportError::from_io)?;

    let mut header = [0u8; HEADER_LEN];
    stream
        .read_exact(&mut header)
        .map_err(TransportError::from_io)?;
    let body_len = frame::body_len(&header, max_frame_size)?;

    let mut buf = frame::buffer_for(&header, body_len);
    stream
        .read_exact(&mut buf[HEADER_LEN..])
        .map_err(TransportError::from_io)?;
    Ok(buf)
}

/// A session driven from inside a tokio runtime.
#[derive(Debug)]
pub struct AsyncSession {
    config: ClientConfig,
    stream: Option<tokio::net::TcpStream>,
}

impl AsyncSession {
    /// Creates a session without connecting it.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    /// Creates a session and connects it.
    pub async fn connect(config: ClientConfig) -> Result<Self, TransportError> {
        let mut session = Self::new(config);
        session.reconnect().await?;
        Ok(session)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Drops any existing socket and connects a fresh one.
    pub async fn reconnect(&mut self) -> Result<(), TransportError> {
        self.close();

        let destination = self.config.destination();
        let connecting =
            tokio::net::TcpStream::connect((self.config.host.as_str(), self.config.port));
        let stream = match tokio::time::timeout(self.config.connect_timeout, connecting).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(TransportError::Connect {
                    destination,
                    source,
                })
            }
            Err(_) => {
                return Err(TransportError::Connect {
                    destination,
                    source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                })
            }
        };

        stream.set_nodelay(true)?;
        tracing::debug!(destination = %destination, "Connected");
        self.stream = Some(stream);
        Ok(())
    }

    /// Sends one request frame and returns the complete response frame.
    pub async fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, ExchangeError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let result = round_trip_async(stream, request, self.config.max_frame_size).await;
        if result.is_err() {
            self.close();
        }
        result
    }

    /// Drops the socket, closing it. Safe to call when not connected.
    pub fn close(&mut self) {
        self.stream = None;
    }
}

async fn round_trip_async(
    stream: &mut tokio::net::TcpStream,
    request: &[u8],
    max_frame_size: u64,
) -> Result<Vec<u8>, ExchangeError> {
    stream
        .write_all(request)
        .await
        .map_err(TransportError::from_io)?;
    stream.flush().await.map_err(TransportError::from_io)?;

    let mut header = [0u8; HEADER_LEN];
    stream
        .read_exact(&mut header)
        .await
        .map_err(TransportError::from_io)?;
    let body_len = frame::body_len(&header, max_frame_size)?;

    let mut buf = frame::buffer_for(&header, body_len);
    stream
        .read_exact(&mut buf[HEADER_LEN..])
        .await
        .map_err(TransportError::from_io)?;
    Ok(buf)
}
