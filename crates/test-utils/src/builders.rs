#![allow(dead_code)]

use swan_exec::config::{ConfigFile, RawConfigFile};
use swan_exec::executor::kubernetes::model::{
    ContainerState, ContainerStateTerminated, ContainerStatus, PodStatus,
};
use swan_exec::executor::kubernetes::PodPhase;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_taskset(mut self, cpus: &str) -> Self {
        self.config.isolation.taskset = Some(cpus.to_string());
        self
    }

    pub fn with_numa_nodes(mut self, nodes: &str) -> Self {
        self.config.isolation.numa_nodes = Some(nodes.to_string());
        self
    }

    pub fn with_cgroup(mut self, spec: &str) -> Self {
        self.config.isolation.cgroups.push(spec.to_string());
        self
    }

    pub fn with_pid_namespace(mut self) -> Self {
        self.config.isolation.pid_namespace = true;
        self
    }

    pub fn with_redis_port(mut self, port: u16) -> Self {
        self.config.redis.port = port;
        self
    }

    pub fn with_memcached_threads(mut self, threads: u32) -> Self {
        self.config.memcached.threads = threads;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    /// Build a validated `ConfigFile`. Panics if validation fails.
    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("ConfigFileBuilder produced invalid config")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for the `status` part of a pod as the API server reports it.
pub struct PodStatusBuilder {
    status: PodStatus,
}

impl PodStatusBuilder {
    pub fn new(phase: PodPhase) -> Self {
        Self {
            status: PodStatus {
                phase,
                ..PodStatus::default()
            },
        }
    }

    pub fn ip(mut self, ip: &str) -> Self {
        self.status.pod_ip = Some(ip.to_string());
        self
    }

    pub fn reason(mut self, reason: &str) -> Self {
        self.status.reason = Some(reason.to_string());
        self
    }

    /// Record a terminated container with `exit_code`.
    pub fn terminated(mut self, container: &str, exit_code: i32) -> Self {
        self.status.container_statuses.push(ContainerStatus {
            name: container.to_string(),
            state: Some(ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code,
                    reason: None,
                }),
            }),
        });
        self
    }

    pub fn build(self) -> PodStatus {
        self.status
    }
}
