// src/workloads/redis.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::Result;
use crate::executor::{Executor, HandleRef};
use crate::workloads::{Launcher, ReadinessProbe, TcpProbe, launch_service};

const NAME: &str = "Redis";

/// `[redis]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub binary_path: String,
    /// `--port`
    pub port: u16,
    /// `--bind`; must be a real interface address for remote clients.
    pub bind_address: String,
    /// `--maxmemory`, in Redis size notation.
    pub max_memory: String,
    /// `--cluster-enabled yes`
    pub cluster_mode: bool,
    /// Redis enables protected mode by default; `false` disables it.
    pub protected_mode: bool,
    pub startup_timeout_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            binary_path: "redis-server".to_string(),
            port: 6379,
            bind_address: "0.0.0.0".to_string(),
            max_memory: "512mb".to_string(),
            cluster_mode: false,
            protected_mode: false,
            startup_timeout_seconds: 5,
        }
    }
}

/// Launcher for a `redis-server` instance.
#[derive(Clone)]
pub struct Redis {
    executor: Arc<dyn Executor>,
    config: RedisConfig,
    probe: Arc<dyn ReadinessProbe>,
}

impl Redis {
    pub fn new(executor: Arc<dyn Executor>, config: RedisConfig) -> Self {
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

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Start command: binary, `--port`, `--bind`, `--maxmemory`, then the
    /// optional cluster and protected-mode flags.
    pub fn command(&self) -> String {
        let cfg = &self.config;
        let mut cmd = format!(
            "{} --port {} --bind {} --maxmemory {}",
            cfg.binary_path, cfg.port, cfg.bind_address, cfg.max_memory
        );

        if cfg.cluster_mode {
            cmd.push_str(" --cluster-enabled yes");
        }
        if !cfg.protected_mode {
            cmd.push_str(" --protected-mode no");
        }

        cmd
    }
}

#[async_trait]
impl Launcher for Redis {
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
