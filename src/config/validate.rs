// src/config/validate.rs

use std::sync::Arc;

use crate::config::model::{ConfigFile, IsolationSection, RawConfigFile};
use crate::errors::{ExecError, Result};
use crate::executor::KubernetesConfig;
use crate::isolation::{
    CgroupExec, CgroupSpec, CpuSet, Decorator, Decorators, Numactl, PidNamespace, Taskset,
};

/// Longest pod name the API server accepts (DNS label).
const MAX_POD_NAME_LEN: usize = 63;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ExecError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    cfg.isolation.decorators()?;
    validate_kubernetes(&cfg.kubernetes)?;
    validate_service("redis", cfg.redis.port, cfg.redis.startup_timeout_seconds)?;
    validate_service(
        "memcached",
        cfg.memcached.port,
        cfg.memcached.startup_timeout_seconds,
    )?;

    if cfg.memcached.threads == 0 {
        return Err(ExecError::ConfigError(
            "[memcached].threads must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_service(section: &str, port: u16, startup_timeout_seconds: u64) -> Result<()> {
    if port == 0 {
        return Err(ExecError::ConfigError(format!(
            "[{section}].port must be between 1 and 65535 (got 0)"
        )));
    }
    if startup_timeout_seconds == 0 {
        return Err(ExecError::ConfigError(format!(
            "[{section}].startup_timeout_seconds must be >= 1 (got 0)"
        )));
    }
    Ok(())
}

fn validate_kubernetes(cfg: &KubernetesConfig) -> Result<()> {
    if cfg.namespace.trim().is_empty() {
        return Err(ExecError::ConfigError(
            "[kubernetes].namespace must not be empty".to_string(),
        ));
    }
    if cfg.poll_interval.is_zero() {
        return Err(ExecError::ConfigError(
            "[kubernetes].poll_interval must be greater than zero".to_string(),
        ));
    }
    if cfg.launch_timeout.is_zero() {
        return Err(ExecError::ConfigError(
            "[kubernetes].launch_timeout must be greater than zero".to_string(),
        ));
    }

    if let Some(name) = &cfg.pod_name {
        check_dns_label("pod_name", name, MAX_POD_NAME_LEN)?;
    }
    // Leave room for "-" and the random suffix.
    check_dns_label("pod_name_prefix", &cfg.pod_name_prefix, MAX_POD_NAME_LEN - 13)?;
    Ok(())
}

fn check_dns_label(field: &str, value: &str, max_len: usize) -> Result<()> {
    let valid_chars = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_edges = !value.starts_with('-') && !value.ends_with('-');

    if value.is_empty() || value.len() > max_len || !valid_chars || !valid_edges {
        return Err(ExecError::ConfigError(format!(
            "[kubernetes].{field} '{value}' must be a lowercase DNS label of at most {max_len} characters"
        )));
    }
    Ok(())
}

impl IsolationSection {
    /// Decorator chain for this section.
    ///
    /// Innermost first: cgroup, numactl, taskset, PID namespace. The
    /// namespace therefore wraps everything else.
    pub fn decorators(&self) -> Result<Decorators> {
        let mut chain: Vec<Arc<dyn Decorator>> = Vec::new();

        if !self.cgroups.is_empty() {
            let groups = self
                .cgroups
                .iter()
                .map(|g| g.parse::<CgroupSpec>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| ExecError::ConfigError(format!("[isolation].cgroups: {e}")))?;
            chain.push(Arc::new(CgroupExec::new(groups)));
        }

        if let Some(nodes) = &self.numa_nodes {
            let nodes = parse_cpuset("numa_nodes", nodes)?;
            chain.push(Arc::new(Numactl::on_nodes(nodes)));
        }

        if let Some(cpus) = &self.taskset {
            let cpus = parse_cpuset("taskset", cpus)?;
            chain.push(Arc::new(Taskset::new(cpus)));
        }

        if self.pid_namespace {
            chain.push(Arc::new(PidNamespace));
        }

        Ok(chain.into_iter().collect())
    }
}

fn parse_cpuset(field: &str, raw: &str) -> Result<CpuSet> {
    raw.parse()
        .map_err(|e| ExecError::ConfigError(format!("[isolation].{field}: {e}")))
}
