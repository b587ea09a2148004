//! End-to-end calls against a real server.
//!
//! Every test starts its own `RpcServer` on `127.0.0.1:0` and talks to it
//! with one of the three stubs.

mod common;

use std::time::Duration;

use common::{TestServer, ADD, ECHO, FAIL, HITS, MISSING, SLOW};
use strandrpc_client::{AsyncClient, Client, ErrorKind, OutboundPool, PoolConfig, PooledClient};

const IDLE: Duration = Duration::from_secs(5);

#[test]
fn test_blocking_round_trips() {
    let server = TestServer::start(IDLE);
    let mut client = Client::connect(server.config()).unwrap();

    assert_eq!(client.call(&ECHO, &("hi".to_string(),)).unwrap(), "hi");
    assert_eq!(client.call(&ADD, &(40, 2)).unwrap(), 42);
    assert_eq!(client.call(&SLOW, &(10,)).unwrap(), 10);
}

#[test]
fn test_blocking_not_found_keeps_connection() {
    let server = TestServer::start(IDLE);
    let mut client = Client::connect(server.config()).unwrap();

    let err = client.call(&MISSING, &()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.routing_key(), MISSING.key());
    assert!(client.session().is_connected());

    assert_eq!(client.call(&ADD, &(1, 1)).unwrap(), 2);
}

#[test]
fn test_blocking_server_exception_keeps_connection() {
    let server = TestServer::start(IDLE);
    let mut client = Client::connect(server.config()).unwrap();

    let err = client.call(&FAIL, &()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServerException);
    assert!(client.session().is_connected());

    assert_eq!(client.call(&ECHO, &("after".to_string(),)).unwrap(), "after");
}

#[tokio::test]
async fn test_async_round_trips() {
    let server = TestServer::start(IDLE);
    let mut client = AsyncClient::connect(server.config()).await.unwrap();

    assert_eq!(client.call(&ECHO, &("hi".to_string(),)).await.unwrap(), "hi");
    assert_eq!(client.call(&ADD, &(-3, 3)).await.unwrap(), 0);

    let err = client.call(&FAIL, &()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServerException);
    assert_eq!(client.call(&SLOW, &(5,)).await.unwrap(), 5);
}

#[tokio::test]
async fn test_shared_instance_sees_every_call() {
    let server = TestServer::start(IDLE);
    let mut first = AsyncClient::connect(server.config()).await.unwrap();
    let mut second = AsyncClient::connect(server.config()).await.unwrap();

    assert_eq!(first.call(&HITS, &()).await.unwrap(), 1);
    assert_eq!(second.call(&HITS, &()).await.unwrap(), 2);
    assert_eq!(first.call(&HITS, &()).await.unwrap(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients() {
    let server = TestServer::start(IDLE);
    let config = server.config();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let config = config.clone();
        tasks.push(tokio::spawn(async move {
            let mut client = AsyncClient::connect(config).await.unwrap();
            for j in 0..10 {
                assert_eq!(client.call(&ADD, &(i, j)).await.unwrap(), i + j);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pooled_clients_across_tasks() {
    let server = TestServer::start(IDLE);
    let client = PooledClient::new(server.config(), OutboundPool::new(PoolConfig::default()));

    let mut tasks = Vec::new();
    for i in 0..16 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            for j in 0..10 {
                assert_eq!(client.call(&ADD, &(i, j)).await.unwrap(), i + j);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_graceful_stop_lets_in_flight_call_finish() {
    let mut server = TestServer::start(IDLE);
    let config = server.config();

    let in_flight = tokio::spawn(async move {
        let mut client = AsyncClient::connect(config).await.unwrap();
        client.call(&SLOW, &(400,)).await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    server.signal_shutdown();

    assert_eq!(in_flight.await.unwrap().unwrap(), 400);

    // The client has been dropped, so the drain completes.
    tokio::task::spawn_blocking(move || server.stop())
        .await
        .unwrap();
}

#[test]
fn test_no_new_connections_after_stop() {
    let server = TestServer::start(IDLE);
    let config = server.config();
    server.stop();

    let err = Client::connect(config).unwrap_err();
    assert!(matches!(
        err,
        strandrpc_client::TransportError::Connect { .. }
    ));
}
