// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Variants follow the lifecycle of a task: it can fail to start, die right
//! after starting, refuse to stop, be asked for an exit code too early, or
//! (for service launchers) never become reachable.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// The backend could not begin execution. No handle exists.
    #[error("{executor}: start of command {command:?} failed: {reason}")]
    StartFailure {
        executor: String,
        command: String,
        reason: String,
    },

    /// The task started but was already dead at the post-start check.
    #[error(
        "{executor}: command {command:?} failed to execute (exit code {exit_code}); stderr: {stderr:?}"
    )]
    ImmediateExit {
        executor: String,
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("stop of command {command:?} failed: {reason}")]
    StopFailure { command: String, reason: String },

    /// Termination could not be confirmed; the process may be leaked.
    #[error("stop of command {command:?} failed: not terminated within {timeout:?}")]
    StopTimeout { command: String, timeout: Duration },

    #[error("task {command:?} is not terminated")]
    NotTerminated { command: String },

    #[error("{workload}: timeout on connection to {address:?} after {timeout:?}")]
    ReadinessTimeout {
        workload: String,
        address: String,
        timeout: Duration,
    },

    #[error("output artifact {path:?} is unavailable: {source}")]
    OutputUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cluster API error: {0}")]
    ClusterApi(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ExecError>;
