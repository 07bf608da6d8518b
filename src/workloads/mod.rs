// src/workloads/mod.rs

//! Service workload launchers.
//!
//! A launcher renders a start command from its config, runs it through an
//! [`Executor`], and only hands the task back once the service answers its
//! readiness probe. The caller then owns the task and must eventually stop
//! it and erase its output.
//!
//! - [`probe`] contains the readiness probes (TCP connect, protocol ping).
//! - [`redis`] and [`memcached`] are the cache-server launchers.

pub mod memcached;
pub mod probe;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use crate::errors::{ExecError, Result};
use crate::executor::{Executor, HandleRef};

pub use memcached::{Memcached, MemcachedConfig};
pub use probe::{ProtocolProbe, ReadinessProbe, TcpProbe, is_listening};
pub use redis::{Redis, RedisConfig};

/// Something that starts a workload and returns its live task.
#[async_trait]
pub trait Launcher: Send + Sync {
    fn name(&self) -> &str;

    async fn launch(&self) -> Result<HandleRef>;
}

/// Start `command` and block until `probe` reports the service reachable on
/// `<task address>:<port>`.
///
/// On readiness timeout the task is stopped and
/// [`ExecError::ReadinessTimeout`] returned; a failure to stop during that
/// cleanup is only logged.
pub async fn launch_service(
    executor: &dyn Executor,
    probe: &dyn ReadinessProbe,
    workload: &str,
    command: &str,
    port: u16,
    timeout: Duration,
) -> Result<HandleRef> {
    let task = executor.execute(command).await?;

    let address = format!("{}:{}", task.address(), port);
    info!(workload, %address, ?timeout, "waiting for service to become ready");

    if !probe.is_ready(&address, timeout).await {
        if let Err(err) = task.stop().await {
            error!(workload, error = %err, "failed to stop service instance");
        }
        return Err(ExecError::ReadinessTimeout {
            workload: workload.to_string(),
            address,
            timeout,
        });
    }

    info!(workload, %address, "service is ready");
    Ok(task)
}
