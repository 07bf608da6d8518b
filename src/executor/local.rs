// src/executor/local.rs

//! Local process executor.
//!
//! Commands run through `sh -c` (`cmd /C` on Windows) as children of this
//! process, with stdout/stderr redirected into the task's output directory.
//!
//! On Unix every child leads its own process group, and `stop` sends
//! `SIGKILL` to the whole group so that anything the command spawned dies
//! with it. Elsewhere only the direct child is killed.

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use crate::config::duration;
use crate::errors::{ExecError, Result};
use crate::executor::completion::{Completion, CompletionSignal, completion};
use crate::executor::output::{OutputFiles, OutputPaths, sync_and_close};
use crate::executor::{
    DEFAULT_START_CHECK, DEFAULT_STOP_GRACE, Executor, HandleRef, TaskHandle, TaskState,
    ensure_started,
};
use crate::isolation::Decorators;

const EXECUTOR_NAME: &str = "Local Executor";
const LOOPBACK: &str = "127.0.0.1";

/// `[local]` section: where outputs go and how long the lifecycle checks wait.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Root under which per-task output directories are created.
    pub output_dir: PathBuf,

    #[serde(deserialize_with = "duration::deserialize")]
    pub start_check: Duration,

    #[serde(deserialize_with = "duration::deserialize")]
    pub stop_grace: Duration,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            output_dir: std::env::temp_dir(),
            start_check: DEFAULT_START_CHECK,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

/// Runs commands as local child processes, optionally wrapped by isolation
/// decorators.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    decorators: Decorators,
    config: LocalConfig,
}

impl LocalExecutor {
    /// Local executor without any isolation.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isolated(decorators: Decorators) -> Self {
        Self {
            decorators,
            config: LocalConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LocalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn decorators(&self) -> &Decorators {
        &self.decorators
    }

    fn start_failure(&self, command: &str, reason: impl Into<String>) -> ExecError {
        ExecError::StartFailure {
            executor: EXECUTOR_NAME.to_string(),
            command: command.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    fn name(&self) -> &str {
        EXECUTOR_NAME
    }

    async fn execute(&self, command: &str) -> Result<HandleRef> {
        let decorated = self.decorators.decorate(command);
        debug!(command = %decorated, "local executor: starting command");

        let output = OutputFiles::create(&self.config.output_dir, command, "local")
            .map_err(|e| self.start_failure(command, format!("creating output files: {e}")))?;
        debug!(
            stdout = %output.paths.stdout.display(),
            stderr = %output.paths.stderr.display(),
            "local executor: created output files"
        );

        let child = match spawn_child(&decorated, &output) {
            Ok(child) => child,
            Err(e) => {
                let _ = output.paths.erase();
                return Err(self.start_failure(command, e.to_string()));
            }
        };

        let Some(pid) = child.id() else {
            let _ = output.paths.erase();
            return Err(self.start_failure(command, "child exited before its pid was known"));
        };
        debug!(pid, "local executor: started");

        let (signal, done) = completion();
        let kill = Arc::new(Notify::new());

        let OutputFiles {
            paths,
            stdout,
            stderr,
        } = output;
        tokio::spawn(watch_child(
            child,
            [stdout, stderr],
            signal,
            Arc::clone(&kill),
            command.to_string(),
        ));

        let handle = Arc::new(LocalTaskHandle {
            command: command.to_string(),
            pid,
            output: paths,
            done,
            kill,
            stop_grace: self.config.stop_grace,
        });

        ensure_started(EXECUTOR_NAME, handle.as_ref(), self.config.start_check).await?;
        debug!(pid, "local executor: pid started successfully");

        Ok(handle)
    }
}

fn spawn_child(command: &str, output: &OutputFiles) -> io::Result<Child> {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(output.stdout.try_clone()?))
        .stderr(Stdio::from(output.stderr.try_clone()?));

    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn()
}

/// Sole owner of the child and of the completion signal.
///
/// Blocks on the child's exit, flushes its output files, then fires the
/// signal. A wait failure that is not a normal exit leaves the task in an
/// unknown state and aborts the whole process.
async fn watch_child(
    mut child: Child,
    outputs: [File; 2],
    signal: CompletionSignal,
    kill: Arc<Notify>,
    command: String,
) {
    let waited = loop {
        tokio::select! {
            status = child.wait() => break status,
            _ = kill.notified() => {
                if let Err(err) = child.start_kill() {
                    warn!(command = %command, error = %err, "failed to kill local task");
                }
            }
        }
    };

    let status = match waited {
        Ok(status) => status,
        Err(err) => {
            error!(
                command = %command,
                error = %err,
                "waiting for local task failed with a non-exit error; aborting"
            );
            std::process::abort();
        }
    };

    let [stdout, stderr] = outputs;
    sync_and_close(stdout, "stdout", &command);
    sync_and_close(stderr, "stderr", &command);

    let exit_code = exit_code_of(status);
    debug!(command = %command, exit_code, "local executor: task exited");
    signal.fire(exit_code);
}

fn exit_code_of(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            debug!(signal = sig, "local task terminated by signal");
        }
    }
    status.code().unwrap_or(-1)
}

/// Handle to a local child process.
#[derive(Debug)]
pub struct LocalTaskHandle {
    command: String,
    pid: u32,
    output: OutputPaths,
    done: Completion,
    #[cfg_attr(unix, allow(dead_code))]
    kill: Arc<Notify>,
    stop_grace: Duration,
}

impl LocalTaskHandle {
    /// Pid of the shell, which is also the process group id on Unix.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[cfg(unix)]
    fn kill_tree(&self) -> io::Result<()> {
        let pgid = libc::pid_t::try_from(self.pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

        debug!(pgid, "sending SIGKILL to process group");
        // SAFETY: kill(2) has no memory-safety preconditions.
        let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            // Group already gone: the watcher is about to report the exit.
            if err.raw_os_error() == Some(libc::ESRCH) {
                debug!(pgid, "process group already gone");
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn kill_tree(&self) -> io::Result<()> {
        self.kill.notify_one();
        Ok(())
    }
}

#[async_trait]
impl TaskHandle for LocalTaskHandle {
    async fn stop(&self) -> Result<()> {
        if self.done.is_fired() {
            return Ok(());
        }

        if let Err(err) = self.kill_tree() {
            error!(command = %self.command, error = %err, "local stop failed");
            return Err(ExecError::StopFailure {
                command: self.command.clone(),
                reason: format!("signalling process group {}: {err}", self.pid),
            });
        }

        if !self.done.wait(Some(self.stop_grace)).await? {
            error!(command = %self.command, "local stop failed: timeout");
            return Err(ExecError::StopTimeout {
                command: self.command.clone(),
                timeout: self.stop_grace,
            });
        }

        Ok(())
    }

    fn status(&self) -> TaskState {
        if self.done.is_fired() {
            TaskState::Terminated
        } else {
            TaskState::Running
        }
    }

    async fn wait(&self, timeout: Option<Duration>) -> Result<bool> {
        self.done.wait(timeout).await
    }

    fn exit_code(&self) -> Result<i32> {
        self.done.exit_code().ok_or_else(|| ExecError::NotTerminated {
            command: self.command.clone(),
        })
    }

    fn stdout_file(&self) -> Result<File> {
        self.output.open_stdout()
    }

    fn stderr_file(&self) -> Result<File> {
        self.output.open_stderr()
    }

    fn erase_output(&self) -> Result<()> {
        self.output.erase()
    }

    fn address(&self) -> String {
        LOOPBACK.to_string()
    }

    fn command(&self) -> &str {
        &self.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_documented_windows() {
        let cfg = LocalConfig::default();
        assert_eq!(cfg.start_check, Duration::from_millis(100));
        assert_eq!(cfg.stop_grace, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn empty_command_is_a_start_failure() {
        let root = tempfile::tempdir().unwrap();
        let exec = LocalExecutor::new().with_config(LocalConfig {
            output_dir: root.path().to_path_buf(),
            ..LocalConfig::default()
        });

        let err = exec.execute("").await.unwrap_err();
        assert!(matches!(err, ExecError::StartFailure { .. }), "got {err:?}");
    }
}
