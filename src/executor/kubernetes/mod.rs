// src/executor/kubernetes/mod.rs

//! Cluster-pod executor.
//!
//! Each command becomes a single-container pod (`sh -c <command>`, restart
//! policy `Never`). A background watcher polls the pod and maps its phase
//! onto [`TaskState`]: `Pending`/`Running` are RUNNING, `Succeeded`/`Failed`
//! are TERMINATED. When the pod finishes, its log is copied into the local
//! `stdout` artifact so handles look the same as local ones, and the pod
//! object is deleted.

pub mod api;
pub mod model;

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::duration;
use crate::errors::{ExecError, Result};
use crate::executor::completion::{Completion, CompletionSignal, completion};
use crate::executor::output::{OutputFiles, OutputPaths, sync_and_close};
use crate::executor::{
    DEFAULT_START_CHECK, DEFAULT_STOP_GRACE, Executor, HandleRef, TaskHandle, TaskState,
    ensure_started,
};
use crate::isolation::Decorators;

pub use api::{PodApi, RestPodApi};
pub use model::{Pod, PodPhase};

use model::{Container, ObjectMeta, PodSpec, ResourceRequirements, SecurityContext};

const EXECUTOR_NAME: &str = "Kubernetes Executor";

pub const DEFAULT_POD_NAME_PREFIX: &str = "swan";
pub const DEFAULT_CONTAINER_IMAGE: &str = "centos_swan_image";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_API_SERVER: &str = "http://127.0.0.1:8080";
const CONTAINER_NAME: &str = "swan";

/// Hex characters of randomness in generated pod names (2^48 space).
const POD_NAME_SUFFIX_LEN: usize = 12;

/// Lower bound for `poll_interval`.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Exit code reported when the pod vanished before reporting one.
const LOST_POD_EXIT_CODE: i32 = -1;

/// `[kubernetes]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KubernetesConfig {
    pub api_server: String,
    pub namespace: String,
    /// Bearer token for the API server, if it requires one.
    pub token: Option<String>,

    /// Exact pod name. Only sensible when a single task is launched.
    pub pod_name: Option<String>,
    /// Prefix of generated pod names when `pod_name` is unset.
    pub pod_name_prefix: String,

    pub container_image: String,
    pub privileged: bool,
    pub host_network: bool,

    /// Millicores; 0 leaves the value unset.
    pub cpu_request: u64,
    pub cpu_limit: u64,
    /// Bytes; 0 leaves the value unset.
    pub memory_request: u64,
    pub memory_limit: u64,

    /// How long a pod may stay `Pending` before the launch is abandoned.
    #[serde(deserialize_with = "duration::deserialize")]
    pub launch_timeout: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub poll_interval: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub stop_grace: Duration,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            api_server: DEFAULT_API_SERVER.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            token: None,
            pod_name: None,
            pod_name_prefix: DEFAULT_POD_NAME_PREFIX.to_string(),
            container_image: DEFAULT_CONTAINER_IMAGE.to_string(),
            privileged: false,
            host_network: false,
            cpu_request: 0,
            cpu_limit: 0,
            memory_request: 0,
            memory_limit: 0,
            launch_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

impl KubernetesConfig {
    fn resources(&self) -> Option<ResourceRequirements> {
        let mut res = ResourceRequirements::default();
        insert_quantity(&mut res.requests, "cpu", self.cpu_request, |v| format!("{v}m"));
        insert_quantity(&mut res.limits, "cpu", self.cpu_limit, |v| format!("{v}m"));
        insert_quantity(&mut res.requests, "memory", self.memory_request, |v| v.to_string());
        insert_quantity(&mut res.limits, "memory", self.memory_limit, |v| v.to_string());
        (!res.is_empty()).then_some(res)
    }
}

fn insert_quantity(
    map: &mut BTreeMap<String, String>,
    key: &str,
    value: u64,
    render: impl Fn(u64) -> String,
) {
    if value > 0 {
        map.insert(key.to_string(), render(value));
    }
}

/// Runs commands in pods through a [`PodApi`].
#[derive(Clone)]
pub struct KubernetesExecutor {
    config: KubernetesConfig,
    api: Arc<dyn PodApi>,
    decorators: Decorators,
    output_dir: PathBuf,
    start_check: Duration,
}

impl KubernetesExecutor {
    /// A zero `poll_interval` is raised to [`MIN_POLL_INTERVAL`].
    pub fn new(mut config: KubernetesConfig, api: Arc<dyn PodApi>) -> Self {
        if config.poll_interval < MIN_POLL_INTERVAL {
            warn!(
                poll_interval = ?config.poll_interval,
                min = ?MIN_POLL_INTERVAL,
                "kubernetes poll interval too small; clamping"
            );
            config.poll_interval = MIN_POLL_INTERVAL;
        }
        Self {
            config,
            api,
            decorators: Decorators::default(),
            output_dir: std::env::temp_dir(),
            start_check: DEFAULT_START_CHECK,
        }
    }

    /// Executor talking to the API server named in `config`.
    pub fn from_config(config: KubernetesConfig) -> Result<Self> {
        let api = RestPodApi::new(config.api_server.clone(), config.token.clone())?;
        Ok(Self::new(config, Arc::new(api)))
    }

    pub fn with_decorators(mut self, decorators: Decorators) -> Self {
        self.decorators = decorators;
        self
    }

    /// Local directory under which pod logs are collected.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_start_check(mut self, window: Duration) -> Self {
        self.start_check = window;
        self
    }

    pub fn config(&self) -> &KubernetesConfig {
        &self.config
    }

    /// Name for the next pod: the configured exact name, or the prefix plus
    /// a random suffix.
    pub fn generate_pod_name(&self) -> String {
        if let Some(name) = self.config.pod_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }

        let prefix = if self.config.pod_name_prefix.is_empty() {
            DEFAULT_POD_NAME_PREFIX
        } else {
            self.config.pod_name_prefix.as_str()
        };
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{prefix}-{}", &suffix[..POD_NAME_SUFFIX_LEN])
    }

    /// Pod object for `command` (already decorated).
    pub fn build_pod(&self, name: &str, command: &str) -> Pod {
        let container = Container {
            name: CONTAINER_NAME.to_string(),
            image: self.config.container_image.clone(),
            command: vec!["sh".to_string(), "-c".to_string(), command.to_string()],
            resources: self.config.resources(),
            security_context: self.config.privileged.then_some(SecurityContext {
                privileged: Some(true),
            }),
        };

        let metadata = ObjectMeta {
            name: name.to_string(),
            namespace: Some(self.config.namespace.clone()),
            labels: BTreeMap::from([("app".to_string(), "swan".to_string())]),
        };

        Pod::new(
            metadata,
            PodSpec {
                containers: vec![container],
                restart_policy: Some("Never".to_string()),
                host_network: self.config.host_network,
                termination_grace_period_seconds: Some(0),
            },
        )
    }

    fn start_failure(&self, command: &str, reason: impl Into<String>) -> ExecError {
        ExecError::StartFailure {
            executor: EXECUTOR_NAME.to_string(),
            command: command.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Debug for KubernetesExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubernetesExecutor")
            .field("config", &self.config)
            .field("decorators", &self.decorators)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Executor for KubernetesExecutor {
    fn name(&self) -> &str {
        EXECUTOR_NAME
    }

    async fn execute(&self, command: &str) -> Result<HandleRef> {
        let decorated = self.decorators.decorate(command);
        let pod_name = self.generate_pod_name();
        let namespace = self.config.namespace.clone();
        debug!(pod = %pod_name, command = %decorated, "kubernetes executor: starting command");

        let output = OutputFiles::create(&self.output_dir, command, "kubernetes")
            .map_err(|e| self.start_failure(command, format!("creating output files: {e}")))?;

        let pod = self.build_pod(&pod_name, &decorated);
        if let Err(err) = self.api.create_pod(&namespace, &pod).await {
            let _ = output.paths.erase();
            return Err(self.start_failure(command, err.to_string()));
        }
        info!(pod = %pod_name, namespace = %namespace, "kubernetes executor: pod created");

        let (signal, done) = completion();
        let (phase_tx, mut phase_rx) = watch::channel(PodPhase::Pending);
        let pod_ip = Arc::new(OnceLock::new());

        let OutputFiles {
            paths,
            stdout,
            stderr,
        } = output;

        tokio::spawn(watch_pod(PodWatcher {
            api: Arc::clone(&self.api),
            namespace: namespace.clone(),
            pod_name: pod_name.clone(),
            poll_interval: self.config.poll_interval,
            stdout,
            stderr,
            signal,
            phase_tx,
            pod_ip: Arc::clone(&pod_ip),
        }));

        let handle = Arc::new(KubernetesTaskHandle {
            command: command.to_string(),
            pod_name: pod_name.clone(),
            namespace,
            api: Arc::clone(&self.api),
            output: paths,
            done,
            pod_ip,
            stop_grace: self.config.stop_grace,
        });

        let scheduled = tokio::time::timeout(self.config.launch_timeout, async move {
            phase_rx
                .wait_for(|phase| *phase != PodPhase::Pending)
                .await
                .map(|_| ())
        })
        .await;

        let reason = match scheduled {
            Ok(Ok(())) => None,
            Ok(Err(_)) => Some(format!("watcher of pod {pod_name:?} exited unexpectedly")),
            Err(_) => Some(format!(
                "pod {pod_name:?} not running within {:?}",
                self.config.launch_timeout
            )),
        };
        if let Some(reason) = reason {
            warn!(pod = %pod_name, %reason, "pod did not start; deleting it");
            if let Err(err) = handle.stop().await {
                error!(pod = %pod_name, error = %err, "failed to delete pod that did not start");
            }
            let _ = handle.erase_output();
            return Err(self.start_failure(command, reason));
        }

        ensure_started(EXECUTOR_NAME, handle.as_ref(), self.start_check).await?;
        debug!(pod = %pod_name, address = %handle.address(), "kubernetes executor: pod started");

        Ok(handle)
    }
}

/// Everything the pod watcher owns.
struct PodWatcher {
    api: Arc<dyn PodApi>,
    namespace: String,
    pod_name: String,
    poll_interval: Duration,
    stdout: File,
    stderr: File,
    signal: CompletionSignal,
    phase_tx: watch::Sender<PodPhase>,
    pod_ip: Arc<OnceLock<String>>,
}

async fn watch_pod(w: PodWatcher) {
    let mut ticker = tokio::time::interval(w.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit_code = loop {
        ticker.tick().await;

        let pod = match w.api.get_pod(&w.namespace, &w.pod_name).await {
            Ok(Some(pod)) => pod,
            Ok(None) => {
                info!(pod = %w.pod_name, "pod no longer exists");
                w.phase_tx.send_replace(PodPhase::Failed);
                break LOST_POD_EXIT_CODE;
            }
            Err(err) => {
                warn!(pod = %w.pod_name, error = %err, "polling pod failed; retrying");
                continue;
            }
        };

        if let Some(ip) = pod.pod_ip() {
            if w.pod_ip.set(ip.to_string()).is_ok() {
                debug!(pod = %w.pod_name, ip, "pod address assigned");
            }
        }

        let phase = pod.phase();
        w.phase_tx.send_if_modified(|current| {
            let changed = *current != phase;
            *current = phase;
            changed
        });

        if phase.is_terminal() {
            let fallback = if phase == PodPhase::Succeeded { 0 } else { 1 };
            break pod.exit_code(CONTAINER_NAME).unwrap_or(fallback);
        }
    };

    let PodWatcher {
        api,
        namespace,
        pod_name,
        mut stdout,
        stderr,
        signal,
        ..
    } = w;

    if exit_code != LOST_POD_EXIT_CODE {
        match api.pod_logs(&namespace, &pod_name, CONTAINER_NAME).await {
            Ok(logs) => {
                if let Err(err) = stdout.write_all(logs.as_bytes()) {
                    error!(pod = %pod_name, error = %err, "cannot write pod log to stdout file");
                }
            }
            Err(err) => warn!(pod = %pod_name, error = %err, "cannot fetch pod log"),
        }

        // Finished pods are not garbage-collected by the cluster.
        match api.delete_pod(&namespace, &pod_name).await {
            Ok(()) => debug!(pod = %pod_name, "deleted finished pod"),
            Err(err) => warn!(pod = %pod_name, error = %err, "cannot delete finished pod"),
        }
    }

    sync_and_close(stdout, "stdout", &pod_name);
    sync_and_close(stderr, "stderr", &pod_name);

    debug!(pod = %pod_name, exit_code, "kubernetes executor: pod terminated");
    signal.fire(exit_code);
}

/// Handle to a pod started by [`KubernetesExecutor`].
pub struct KubernetesTaskHandle {
    command: String,
    pod_name: String,
    namespace: String,
    api: Arc<dyn PodApi>,
    output: OutputPaths,
    done: Completion,
    pod_ip: Arc<OnceLock<String>>,
    stop_grace: Duration,
}

impl KubernetesTaskHandle {
    pub fn pod_name(&self) -> &str {
        &self.pod_name
    }
}

impl fmt::Debug for KubernetesTaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubernetesTaskHandle")
            .field("command", &self.command)
            .field("pod_name", &self.pod_name)
            .field("namespace", &self.namespace)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TaskHandle for KubernetesTaskHandle {
    async fn stop(&self) -> Result<()> {
        if self.done.is_fired() {
            return Ok(());
        }

        debug!(pod = %self.pod_name, "deleting pod");
        if let Err(err) = self.api.delete_pod(&self.namespace, &self.pod_name).await {
            error!(command = %self.command, error = %err, "kubernetes stop failed");
            return Err(ExecError::StopFailure {
                command: self.command.clone(),
                reason: format!("deleting pod {:?}: {err}", self.pod_name),
            });
        }

        if !self.done.wait(Some(self.stop_grace)).await? {
            error!(command = %self.command, "kubernetes stop failed: timeout");
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
        self.pod_ip.get().cloned().unwrap_or_default()
    }

    fn command(&self) -> &str {
        &self.command
    }
}
