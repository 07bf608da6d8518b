// src/workloads/probe.rs

//! Readiness probes used by service launchers.

use std::future::Future;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep};
use tracing::trace;

const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);
const RESPONSE_BUF_LEN: usize = 512;
/// Deadline used when `now + timeout` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Decides whether a service at `address` (`host:port`) is ready.
///
/// Implementations keep retrying until `timeout` elapses and never take
/// (much) longer than that.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn is_ready(&self, address: &str, timeout: Duration) -> bool;
}

/// Ready once a TCP connection is accepted.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    retry_interval: Duration,
}

impl TcpProbe {
    pub fn with_retry_interval(retry_interval: Duration) -> Self {
        Self { retry_interval }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

#[async_trait]
impl ReadinessProbe for TcpProbe {
    async fn is_ready(&self, address: &str, timeout: Duration) -> bool {
        retry_until(timeout, self.retry_interval, || async move {
            TcpStream::connect(address).await.is_ok()
        })
        .await
    }
}

/// Check whether something listens on `address`, retrying until `timeout`.
pub async fn is_listening(address: &str, timeout: Duration) -> bool {
    TcpProbe::default().is_ready(address, timeout).await
}

/// Ready once the service answers `request` with a response starting with
/// `expected_prefix`.
#[derive(Debug, Clone)]
pub struct ProtocolProbe {
    request: &'static [u8],
    expected_prefix: &'static [u8],
    retry_interval: Duration,
}

impl ProtocolProbe {
    pub fn new(request: &'static [u8], expected_prefix: &'static [u8]) -> Self {
        Self {
            request,
            expected_prefix,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Redis inline `PING`, answered with `+PONG`.
    pub fn redis_ping() -> Self {
        Self::new(b"PING\r\n", b"+PONG")
    }

    /// Memcached `stats`, answered with `STAT ...` lines.
    pub fn memcached_stats() -> Self {
        Self::new(b"stats\r\n", b"STAT")
    }
}

#[async_trait]
impl ReadinessProbe for ProtocolProbe {
    async fn is_ready(&self, address: &str, timeout: Duration) -> bool {
        retry_until(timeout, self.retry_interval, || async move {
            match send_request(address, self.request).await {
                Ok(resp) => resp.starts_with(self.expected_prefix),
                Err(err) => {
                    trace!(address, error = %err, "protocol probe attempt failed");
                    false
                }
            }
        })
        .await
    }
}

/// Send `request` and return the first chunk of the response.
pub async fn send_request(address: &str, request: &[u8]) -> io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(address).await?;
    stream.write_all(request).await?;

    let mut buf = vec![0u8; RESPONSE_BUF_LEN];
    let n = stream.read(&mut buf).await?;
    buf.truncate(n);
    Ok(buf)
}

/// Run `attempt` until it succeeds or `timeout` elapses, sleeping
/// `interval` between tries. Each attempt is itself bounded by the deadline.
async fn retry_until<F, Fut>(timeout: Duration, interval: Duration, mut attempt: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let now = Instant::now();
    let deadline = now.checked_add(timeout).unwrap_or(now + FAR_FUTURE);

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        if let Ok(true) = tokio::time::timeout(remaining, attempt()).await {
            return true;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        sleep(interval.min(remaining)).await;
    }
}
