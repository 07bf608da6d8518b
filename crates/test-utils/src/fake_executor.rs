use std::collections::VecDeque;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use swan_exec::errors::{ExecError, Result};
use swan_exec::executor::{Executor, HandleRef, TaskHandle, TaskState};
use swan_exec::workloads::ReadinessProbe;

/// What the next `FakeExecutor::execute` call should produce.
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    /// A task that keeps running until stopped or terminated by the test.
    Running,
    /// A task that is already terminated with this code.
    Exited(i32),
    /// `execute` fails with `StartFailure`.
    StartFailure(String),
}

/// A fake executor that:
/// - records every command it was asked to run
/// - hands out `FakeTaskHandle`s according to a scripted queue of outcomes
///   (`FakeOutcome::Running` once the queue is empty).
pub struct FakeExecutor {
    address: String,
    fail_stop: bool,
    outcomes: Mutex<VecDeque<FakeOutcome>>,
    executed: Mutex<Vec<String>>,
    handles: Mutex<Vec<Arc<FakeTaskHandle>>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            fail_stop: false,
            outcomes: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = address.to_string();
        self
    }

    /// Handles produced by this executor fail every `stop` call.
    pub fn with_failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn push_outcome(&self, outcome: FakeOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn handles(&self) -> Vec<Arc<FakeTaskHandle>> {
        self.handles.lock().unwrap().clone()
    }
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    fn name(&self) -> &str {
        "Fake Executor"
    }

    async fn execute(&self, command: &str) -> Result<HandleRef> {
        self.executed.lock().unwrap().push(command.to_string());

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(FakeOutcome::Running);

        let handle = match outcome {
            FakeOutcome::StartFailure(reason) => {
                return Err(ExecError::StartFailure {
                    executor: self.name().to_string(),
                    command: command.to_string(),
                    reason,
                });
            }
            FakeOutcome::Running => FakeTaskHandle::running(command, &self.address),
            FakeOutcome::Exited(code) => {
                let handle = FakeTaskHandle::running(command, &self.address);
                handle.terminate(code);
                handle
            }
        };
        let handle = Arc::new(handle.fail_stop(self.fail_stop));

        self.handles.lock().unwrap().push(Arc::clone(&handle));
        Ok(handle)
    }
}

/// In-memory task handle driven by the test.
#[derive(Debug)]
pub struct FakeTaskHandle {
    command: String,
    address: String,
    state: watch::Sender<Option<i32>>,
    fail_stop: bool,
    stop_calls: AtomicUsize,
    erase_calls: AtomicUsize,
}

impl FakeTaskHandle {
    pub fn running(command: &str, address: &str) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            command: command.to_string(),
            address: address.to_string(),
            state,
            fail_stop: false,
            stop_calls: AtomicUsize::new(0),
            erase_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_stop(mut self, fail: bool) -> Self {
        self.fail_stop = fail;
        self
    }

    /// Mark the task terminated. Later calls keep the first exit code.
    pub fn terminate(&self, exit_code: i32) {
        self.state.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(exit_code);
            true
        });
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn erase_calls(&self) -> usize {
        self.erase_calls.load(Ordering::SeqCst)
    }

    fn unavailable(&self, stream: &str) -> ExecError {
        ExecError::OutputUnavailable {
            path: PathBuf::from(format!("fake/{stream}")),
            source: io::Error::new(io::ErrorKind::NotFound, "fake task has no output"),
        }
    }
}

#[async_trait]
impl TaskHandle for FakeTaskHandle {
    async fn stop(&self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            return Err(ExecError::StopFailure {
                command: self.command.clone(),
                reason: "fake stop failure".to_string(),
            });
        }
        self.terminate(-1);
        Ok(())
    }

    fn status(&self) -> TaskState {
        if self.state.borrow().is_some() {
            TaskState::Terminated
        } else {
            TaskState::Running
        }
    }

    async fn wait(&self, timeout: Option<Duration>) -> Result<bool> {
        let mut rx = self.state.subscribe();
        let fut = async move { rx.wait_for(|s| s.is_some()).await.is_ok() };
        match timeout {
            None => Ok(fut.await),
            Some(t) => Ok(tokio::time::timeout(t, fut).await.unwrap_or(false)),
        }
    }

    fn exit_code(&self) -> Result<i32> {
        (*self.state.borrow()).ok_or_else(|| ExecError::NotTerminated {
            command: self.command.clone(),
        })
    }

    fn stdout_file(&self) -> Result<File> {
        Err(self.unavailable("stdout"))
    }

    fn stderr_file(&self) -> Result<File> {
        Err(self.unavailable("stderr"))
    }

    fn erase_output(&self) -> Result<()> {
        self.erase_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    fn command(&self) -> &str {
        &self.command
    }
}

/// Wraps a real executor and keeps every handle it returned, so tests can
/// inspect tasks that a launcher stopped and never handed back.
pub struct RecordingExecutor {
    inner: Arc<dyn Executor>,
    handles: Mutex<Vec<HandleRef>>,
}

impl RecordingExecutor {
    pub fn new(inner: Arc<dyn Executor>) -> Self {
        Self {
            inner,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn handles(&self) -> Vec<HandleRef> {
        self.handles.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn execute(&self, command: &str) -> Result<HandleRef> {
        let handle = self.inner.execute(command).await?;
        self.handles.lock().unwrap().push(Arc::clone(&handle));
        Ok(handle)
    }
}

/// Probe with a fixed answer that counts how often it was asked.
#[derive(Debug)]
pub struct StaticProbe {
    ready: bool,
    calls: AtomicUsize,
    addresses: Mutex<Vec<String>>,
}

impl StaticProbe {
    pub fn new(ready: bool) -> Self {
        Self {
            ready,
            calls: AtomicUsize::new(0),
            addresses: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn addresses(&self) -> Vec<String> {
        self.addresses.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReadinessProbe for StaticProbe {
    async fn is_ready(&self, address: &str, _timeout: Duration) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.addresses.lock().unwrap().push(address.to_string());
        self.ready
    }
}
