// src/config/model.rs

use serde::Deserialize;

use crate::executor::{KubernetesConfig, LocalConfig};
use crate::workloads::{MemcachedConfig, RedisConfig};

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [local]
/// output_dir = "/var/tmp/swan"
/// start_check = "100ms"
/// stop_grace = "5s"
///
/// [isolation]
/// taskset = "0-3"
/// cgroups = ["cpu,cpuset:/swan/hp"]
///
/// [redis]
/// port = 6380
/// max_memory = "1gb"
/// ```
///
/// All sections are optional and have documented defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub local: LocalConfig,

    #[serde(default)]
    pub isolation: IsolationSection,

    #[serde(default)]
    pub kubernetes: KubernetesConfig,

    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub memcached: MemcachedConfig,
}

/// `[isolation]` section: decorators applied to locally executed commands.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IsolationSection {
    /// CPU list for `taskset`, e.g. `"0-3,6"`.
    #[serde(default)]
    pub taskset: Option<String>,

    /// NUMA nodes for both CPU and memory binding via `numactl`.
    #[serde(default)]
    pub numa_nodes: Option<String>,

    /// `controllers:path` entries for `cgexec`.
    #[serde(default)]
    pub cgroups: Vec<String>,

    /// Run commands in their own PID namespace.
    #[serde(default)]
    pub pid_namespace: bool,
}

/// Validated configuration. Build it through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub local: LocalConfig,
    pub isolation: IsolationSection,
    pub kubernetes: KubernetesConfig,
    pub redis: RedisConfig,
    pub memcached: MemcachedConfig,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            local: raw.local,
            isolation: raw.isolation,
            kubernetes: raw.kubernetes,
            redis: raw.redis,
            memcached: raw.memcached,
        }
    }
}
