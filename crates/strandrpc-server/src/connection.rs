//! Per-connection task.
//!
//! A connection is a strictly serial loop:
//!
//! ```text
//! ReadHeader -> ReadBody -> Dispatch -> WriteResponse -> ReadHeader ...
//! ```
//!
//! Requests are never pipelined: the next header is not read until the
//! previous response has been written. Every IO step races the idle timeout
//! and the first to finish wins; dispatch itself is not timed. Any error or
//! timeout ends the task and closes the socket. A peer that closes cleanly
//! between frames ends it without error.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use strandrpc_common::frame::{self, HEADER_LEN};
use strandrpc_common::Request;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::ServerConfig;
use crate::error::ConnectionError;
use crate::registry::Registry;

/// The IO step a connection was in when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ReadHeader,
    ReadBody,
    WriteResponse,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::ReadHeader => "read header",
            Phase::ReadBody => "read body",
            Phase::WriteResponse => "write response",
        };
        f.write_str(name)
    }
}

/// Limits applied to every connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub idle_timeout: Duration,
    pub max_frame_size: u64,
}

impl From<&ServerConfig> for ConnectionSettings {
    fn from(config: &ServerConfig) -> Self {
        ConnectionSettings {
            idle_timeout: config.idle_timeout,
            max_frame_size: config.max_frame_size,
        }
    }
}

enum State {
    ReadHeader,
    ReadBody {
        header: [u8; HEADER_LEN],
        body_len: usize,
    },
    Dispatch(Request),
    WriteResponse(Vec<u8>),
}

/// Serves requests on `stream` until the peer leaves or something fails.
///
/// The stream is shut down before returning in every case.
pub async fn serve<S>(
    mut stream: S,
    registry: Arc<Registry>,
    settings: ConnectionSettings,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = drive(&mut stream, &registry, settings).await;

    match &result {
        Ok(()) => tracing::debug!("Connection closed by peer"),
        Err(e @ ConnectionError::Io { .. }) => tracing::debug!("Closing connection: {}", e),
        Err(e) => tracing::warn!("Closing connection: {}", e),
    }
    let _ = tokio::time::timeout(settings.idle_timeout, stream.shutdown()).await;

    result
}

async fn drive<S>(
    stream: &mut S,
    registry: &Registry,
    settings: ConnectionSettings,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let idle = settings.idle_timeout;
    let mut state = State::ReadHeader;

    loop {
        state = match state {
            State::ReadHeader => {
                let mut header = [0u8; HEADER_LEN];
                let more =
                    with_idle_timeout(Phase::ReadHeader, idle, read_header(stream, &mut header))
                        .await?;
                if !more {
                    return Ok(());
                }
                let body_len = frame::body_len(&header, settings.max_frame_size)?;
                State::ReadBody { header, body_len }
            }
            State::ReadBody { header, body_len } => {
                let mut buf = frame::buffer_for(&header, body_len);
                with_idle_timeout(
                    Phase::ReadBody,
                    idle,
                    stream.read_exact(&mut buf[HEADER_LEN..]),
                )
                .await?;
                State::Dispatch(frame::decode(&buf)?)
            }
            State::Dispatch(request) => {
                tracing::trace!(routing_key = %request.routing_key, "Dispatching request");
                let response = registry.dispatch(request).await;
                State::WriteResponse(frame::encode(&response)?)
            }
            State::WriteResponse(buf) => {
                with_idle_timeout(Phase::WriteResponse, idle, async {
                    stream.write_all(&buf).await?;
                    stream.flush().await
                })
                .await?;
                State::ReadHeader
            }
        };
    }
}

/// Fills `header`, returning `false` if the peer closed before sending a
/// single byte of it.
async fn read_header<S>(stream: &mut S, header: &mut [u8; HEADER_LEN]) -> io::Result<bool>
where
    S: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = stream.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        filled += n;
    }
    Ok(true)
}

async fn with_idle_timeout<F, T>(phase: Phase, after: Duration, op: F) -> Result<T, ConnectionError>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(after, op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(ConnectionError::Io { phase, source }),
        Err(_) => Err(ConnectionError::Timeout { phase, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use strandrpc_common::{frame::DEFAULT_MAX_FRAME_SIZE, Procedure, Response, Status};
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;

    const ECHO: Procedure<(String,), String> = Procedure::function("echo");
    const FAIL: Procedure<(), ()> = Procedure::function("fail");
    const SLOW: Procedure<(), ()> = Procedure::function("slow");
    const MARK: Procedure<(), ()> = Procedure::function("mark");
    const EXPLODE: Procedure<(), ()> = Procedure::function("explode");

    fn settings(idle_timeout: Duration) -> ConnectionSettings {
        ConnectionSettings {
            idle_timeout,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    fn echo_registry() -> Registry {
        let mut builder = Registry::builder();
        builder
            .function(&ECHO, |(s,)| Ok(s))
            .unwrap()
            .function(&FAIL, |()| Err(anyhow::anyhow!("nope")))
            .unwrap();
        builder.build()
    }

    fn spawn(
        registry: Registry,
        idle_timeout: Duration,
    ) -> (DuplexStream, JoinHandle<Result<(), ConnectionError>>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(serve(server, Arc::new(registry), settings(idle_timeout)));
        (client, task)
    }

    async fn read_frame(stream: &mut DuplexStream) -> io::Result<Vec<u8>> {
        let mut header = [0u8; HEADER_LEN];
        stream.read_exact(&mut header).await?;
        let body_len = frame::body_len(&header, DEFAULT_MAX_FRAME_SIZE)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut buf = frame::buffer_for(&header, body_len);
        stream.read_exact(&mut buf[HEADER_LEN..]).await?;
        Ok(buf)
    }

    async fn send(stream: &mut DuplexStream, routing_key: String, payload: Vec<u8>) {
        let request = frame::encode(&Request::new(routing_key, payload)).unwrap();
        stream.write_all(&request).await.unwrap();
    }

    async fn receive(stream: &mut DuplexStream) -> Response {
        frame::decode(&read_frame(stream).await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_serves_several_requests_on_one_connection() {
        let (mut client, task) = spawn(echo_registry(), Duration::from_secs(5));

        for word in ["one", "two", "three"] {
            let args = frame::encode(&(word.to_string(),)).unwrap();
            send(&mut client, ECHO.key(), args).await;
            let response = receive(&mut client).await;
            assert_eq!(response.status, Status::Success);
            assert_eq!(frame::decode::<String>(&response.payload).unwrap(), word);
        }

        drop(client);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_server_exception_keeps_connection_open() {
        let (mut client, task) = spawn(echo_registry(), Duration::from_secs(5));

        send(&mut client, FAIL.key(), frame::encode(&()).unwrap()).await;
        assert_eq!(receive(&mut client).await.status, Status::ServerException);

        let missing = "missing--fn() -> ()".to_string();
        send(&mut client, missing, frame::encode(&()).unwrap()).await;
        assert_eq!(receive(&mut client).await.status, Status::NotFound);

        let args = frame::encode(&("still here".to_string(),)).unwrap();
        send(&mut client, ECHO.key(), args).await;
        assert_eq!(receive(&mut client).await.status, Status::Success);

        drop(client);
        assert!(task.await.unwrap().is_ok());
    }

    fn detonate() -> anyhow::Result<()> {
        panic!("BOOM after await")
    }

    #[tokio::test]
    async fn test_suspending_panic_keeps_connection_open() {
        let mut builder = Registry::builder();
        builder
            .suspending_function(&EXPLODE, |()| async {
                tokio::task::yield_now().await;
                detonate()
            })
            .unwrap()
            .function(&ECHO, |(s,)| Ok(s))
            .unwrap();

        let (mut client, task) = spawn(builder.build(), Duration::from_secs(5));

        send(&mut client, EXPLODE.key(), frame::encode(&()).unwrap()).await;
        assert_eq!(receive(&mut client).await.status, Status::ServerException);

        let args = frame::encode(&("after panic".to_string(),)).unwrap();
        send(&mut client, ECHO.key(), args).await;
        let response = receive(&mut client).await;
        assert_eq!(response.status, Status::Success);
        assert_eq!(
            frame::decode::<String>(&response.payload).unwrap(),
            "after panic"
        );

        drop(client);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_requests_are_handled_strictly_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = Registry::builder();
        let slow_log = Arc::clone(&log);
        builder
            .suspending_function(&SLOW, move |()| {
                let log = Arc::clone(&slow_log);
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    log.lock().unwrap().push("slow");
                    anyhow::Ok(())
                }
            })
            .unwrap();
        let mark_log = Arc::clone(&log);
        builder
            .function(&MARK, move |()| {
                mark_log.lock().unwrap().push("mark");
                Ok(())
            })
            .unwrap();

        let (mut client, task) = spawn(builder.build(), Duration::from_secs(5));

        // Both requests are on the wire before either response is read.
        send(&mut client, SLOW.key(), frame::encode(&()).unwrap()).await;
        send(&mut client, MARK.key(), frame::encode(&()).unwrap()).await;

        assert_eq!(receive(&mut client).await.status, Status::Success);
        assert_eq!(receive(&mut client).await.status, Status::Success);
        assert_eq!(*log.lock().unwrap(), vec!["slow", "mark"]);

        drop(client);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_idle_connection_times_out_and_closes() {
        let (mut client, task) = spawn(echo_registry(), Duration::from_millis(50));

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Timeout {
                phase: Phase::ReadHeader,
                ..
            }
        ));

        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stalled_body_times_out() {
        let (mut client, task) = spawn(echo_registry(), Duration::from_millis(50));

        client.write_all(&10u64.to_le_bytes()).await.unwrap();
        client.write_all(&[0, 1]).await.unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Timeout {
                phase: Phase::ReadBody,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_malformed_request_closes_connection() {
        let (mut client, task) = spawn(echo_registry(), Duration::from_secs(5));

        client.write_all(&3u64.to_le_bytes()).await.unwrap();
        client.write_all(&[0xff, 0xff, 0xff]).await.unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ConnectionError::Protocol(_)));

        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_oversized_frame_closes_connection() {
        let (mut client, task) = spawn(echo_registry(), Duration::from_secs(5));

        client.write_all(&u64::MAX.to_le_bytes()).await.unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ConnectionError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_eof_inside_header_is_an_error() {
        let (mut client, task) = spawn(echo_registry(), Duration::from_secs(5));

        client.write_all(&[1, 2, 3]).await.unwrap();
        drop(client);

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Io {
                phase: Phase::ReadHeader,
                ..
            }
        ));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::ReadHeader.to_string(), "read header");
        assert_eq!(Phase::WriteResponse.to_string(), "write response");
    }
}
