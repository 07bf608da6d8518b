// tests/probes.rs

use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use swan_exec::workloads::probe::send_request;
use swan_exec::workloads::{ProtocolProbe, ReadinessProbe, TcpProbe, is_listening};
use swan_exec_test_utils::init_tracing;

/// Accept connections forever and answer each request with `reply`.
async fn reply_server(reply: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 64];
                if sock.read(&mut buf).await.is_ok() {
                    let _ = sock.write_all(reply).await;
                }
            });
        }
    });

    address
}

fn unused_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

#[tokio::test]
async fn tcp_probe_sees_a_listener() {
    init_tracing();
    let address = reply_server(b"").await;

    assert!(TcpProbe::default().is_ready(&address, Duration::from_secs(1)).await);
    assert!(is_listening(&address, Duration::from_secs(1)).await);
}

#[tokio::test]
async fn tcp_probe_gives_up_at_the_deadline() {
    init_tracing();
    let address = unused_address();

    let started = Instant::now();
    assert!(!is_listening(&address, Duration::from_millis(300)).await);
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
}

#[tokio::test]
async fn tcp_probe_retries_until_the_service_comes_up() {
    init_tracing();
    let address = unused_address();

    let late = address.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let listener = TcpListener::bind(&late).await.unwrap();
        let _ = listener.accept().await;
    });

    let probe = TcpProbe::with_retry_interval(Duration::from_millis(20));
    assert!(probe.is_ready(&address, Duration::from_secs(3)).await);
}

#[tokio::test]
async fn redis_ping_probe_wants_pong() {
    init_tracing();
    let good = reply_server(b"+PONG\r\n").await;
    let bad = reply_server(b"-LOADING\r\n").await;

    let probe = ProtocolProbe::redis_ping();
    assert!(probe.is_ready(&good, Duration::from_secs(1)).await);
    assert!(!probe.is_ready(&bad, Duration::from_millis(300)).await);
}

#[tokio::test]
async fn memcached_stats_probe_wants_stat_lines() {
    init_tracing();
    let address = reply_server(b"STAT pid 42\r\nEND\r\n").await;

    assert!(
        ProtocolProbe::memcached_stats()
            .is_ready(&address, Duration::from_secs(1))
            .await
    );
}

#[tokio::test]
async fn send_request_returns_the_first_response_chunk() {
    init_tracing();
    let address = reply_server(b"+PONG\r\n").await;

    let resp = send_request(&address, b"PING\r\n").await.unwrap();
    assert_eq!(resp, b"+PONG\r\n");
}
