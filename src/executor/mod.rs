// src/executor/mod.rs

//! Execution backends.
//!
//! An [`Executor`] starts a shell command somewhere and hands back a
//! [`TaskHandle`] that can be polled, waited on and stopped the same way no
//! matter where the command runs.
//!
//! - [`local`] runs commands as child processes of this process.
//! - [`kubernetes`] runs commands inside pods created through the cluster API.
//! - [`completion`] is the one-shot termination signal both backends use.
//! - [`output`] manages the stdout/stderr artifact directories.

pub mod completion;
pub mod kubernetes;
pub mod local;
pub mod output;

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::errors::{ExecError, Result};

pub use kubernetes::{KubernetesConfig, KubernetesExecutor, KubernetesTaskHandle};
pub use local::{LocalConfig, LocalExecutor, LocalTaskHandle};

/// How long `execute` watches a fresh task before trusting that it started.
pub const DEFAULT_START_CHECK: Duration = Duration::from_millis(100);

/// How long `stop` waits for the watcher to confirm termination.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Stderr bytes quoted in an `ImmediateExit` error.
const STDERR_TAIL_BYTES: u64 = 2048;

/// Lifecycle state of a task.
///
/// A handle starts `Running` and moves to `Terminated` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Terminated,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Running => write!(f, "RUNNING"),
            TaskState::Terminated => write!(f, "TERMINATED"),
        }
    }
}

/// Handle to one started unit of work.
///
/// All methods take `&self` and are safe to call concurrently.
#[async_trait]
pub trait TaskHandle: Send + Sync + fmt::Debug {
    /// Forcefully terminate the task and confirm it is gone.
    ///
    /// Returns `Ok(())` immediately when the task already terminated.
    async fn stop(&self) -> Result<()>;

    /// Non-blocking view of the completion signal.
    fn status(&self) -> TaskState;

    /// Wait for termination.
    ///
    /// `None` waits forever, `Some(Duration::ZERO)` only reports the current
    /// state. Returns whether the task is terminated; a timeout is not an
    /// error.
    async fn wait(&self, timeout: Option<Duration>) -> Result<bool>;

    /// Exit status, available only once terminated. Signal-killed tasks
    /// report `-1`.
    fn exit_code(&self) -> Result<i32>;

    /// Open the captured stdout for reading.
    fn stdout_file(&self) -> Result<File>;

    /// Open the captured stderr for reading.
    fn stderr_file(&self) -> Result<File>;

    /// Delete the output artifacts. Safe to call more than once.
    fn erase_output(&self) -> Result<()>;

    /// Address at which a service started by this task can be reached.
    ///
    /// May be empty while a remote task is not scheduled yet.
    fn address(&self) -> String;

    /// The command this task was started with (before decoration).
    fn command(&self) -> &str;
}

/// Shared task handle as returned by executors.
pub type HandleRef = Arc<dyn TaskHandle>;

/// Something that can start a shell command.
#[async_trait]
pub trait Executor: Send + Sync {
    /// User-friendly executor name, used in logs and errors.
    fn name(&self) -> &str;

    /// Start `command`.
    ///
    /// On success the task has already begun running. A task that dies with
    /// a non-zero exit code within the start-check window is reported as
    /// [`ExecError::ImmediateExit`] and no handle is returned.
    async fn execute(&self, command: &str) -> Result<HandleRef>;
}

/// Best-effort check that a freshly started task did not die right away.
///
/// This is a heuristic: a task that fails slower than `window` still counts
/// as started. On failure the task's output is erased, since the caller
/// never gets a handle to do it.
pub(crate) async fn ensure_started(
    executor: &str,
    handle: &dyn TaskHandle,
    window: Duration,
) -> Result<()> {
    if !handle.wait(Some(window)).await? {
        return Ok(());
    }

    let exit_code = handle.exit_code()?;
    if exit_code == 0 {
        debug!(
            executor,
            command = %handle.command(),
            "task finished successfully within the start-check window"
        );
        return Ok(());
    }

    let stderr = captured_tail(handle);
    if let Err(err) = handle.erase_output() {
        warn!(
            executor,
            command = %handle.command(),
            error = %err,
            "failed to erase output of task that failed to execute"
        );
    }

    Err(ExecError::ImmediateExit {
        executor: executor.to_string(),
        command: handle.command().to_string(),
        exit_code,
        stderr,
    })
}

/// Tail of stderr, falling back to stdout for backends that merge streams.
fn captured_tail(handle: &dyn TaskHandle) -> String {
    let stderr = handle
        .stderr_file()
        .ok()
        .and_then(|f| read_tail(f, STDERR_TAIL_BYTES).ok())
        .unwrap_or_default();
    if !stderr.trim().is_empty() {
        return stderr.trim_end().to_string();
    }

    handle
        .stdout_file()
        .ok()
        .and_then(|f| read_tail(f, STDERR_TAIL_BYTES).ok())
        .unwrap_or_default()
        .trim_end()
        .to_string()
}

fn read_tail(mut file: File, max_bytes: u64) -> std::io::Result<String> {
    let len = file.metadata()?.len();
    file.seek(SeekFrom::Start(len.saturating_sub(max_bytes)))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn task_state_renders_upper_case() {
        assert_eq!(TaskState::Running.to_string(), "RUNNING");
        assert_eq!(TaskState::Terminated.to_string(), "TERMINATED");
    }

    #[test]
    fn read_tail_keeps_only_last_bytes() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"0123456789").unwrap();
        assert_eq!(read_tail(file.try_clone().unwrap(), 4).unwrap(), "6789");
        assert_eq!(read_tail(file, 100).unwrap(), "0123456789");
    }
}
