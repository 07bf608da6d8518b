// src/workloads/memcached.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::Result;
use crate::executor::{Executor, HandleRef};
use crate::workloads::{Launcher, ReadinessProbe, TcpProbe, launch_service};

const NAME: &str = "Memcached";

/// `[memcached]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MemcachedConfig {
    pub binary_path: String,
    /// `-p`
    pub port: u16,
    /// `-u`; memcached refuses to run as root without it.
    pub user: String,
    /// `-t`
    pub threads: u32,
    /// `-m`, in megabytes.
    pub max_memory_mb: u64,
    /// `-c`
    pub max_connections: u32,
    /// `-l`
    pub listen_address: String,
    pub startup_timeout_seconds: u64,
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        Self {
            binary_path: "memcached".to_string(),
            port: 11211,
            user: "root".to_string(),
            threads: 4,
            max_memory_mb: 64,
            max_connections: 1024,
            listen_address: "127.0.0.1".to_string(),
            startup_timeout_seconds: 5,
        }
    }
}

/// Launcher for a `memcached` instance.
#[derive(Clone)]
pub struct Memcached {
    executor: Arc<dyn Executor>,
    config: MemcachedConfig,
    probe: Arc<dyn ReadinessProbe>,
}

impl Memcached {
    pub fn new(executor: Arc<dyn Executor>, config: MemcachedConfig) -> Self {
        Self {
            executor,
            config,
            probe: Arc::new(TcpProbe::default()),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn config(&self) -> &MemcachedConfig {
        &self.config
    }

    pub fn command(&self) -> String {
        let cfg = &self.config;
        format!(
            "{} -p {} -u {} -t {} -m {} -c {} -l {}",
            cfg.binary_path,
            cfg.port,
            cfg.user,
            cfg.threads,
            cfg.max_memory_mb,
            cfg.max_connections,
            cfg.listen_address
        )
    }
}

#[async_trait]
impl Launcher for Memcached {
    fn name(&self) -> &str {
        NAME
    }

    async fn launch(&self) -> Result<HandleRef> {
        launch_service(
            self.executor.as_ref(),
            self.probe.as_ref(),
            NAME,
            &self.command(),
            self.config.port,
            Duration::from_secs(self.config.startup_timeout_seconds),
        )
        .await
    }
}
