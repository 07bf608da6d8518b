use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use swan_exec::errors::{ExecError, Result};
use swan_exec::executor::kubernetes::model::PodStatus;
use swan_exec::executor::kubernetes::{Pod, PodApi, PodPhase};

use crate::builders::PodStatusBuilder;

/// Name of the single container the executor puts in each pod.
pub const CONTAINER: &str = "swan";

/// How freshly created pods behave in a `FakePodApi`.
#[derive(Debug, Clone)]
pub enum PodScenario {
    /// Scheduled and running with this IP until `finish` or deletion.
    Run { ip: String },
    /// Already finished with `exit_code` when first polled.
    Exit { ip: String, exit_code: i32 },
    /// Never leaves `Pending`.
    StayPending,
}

#[derive(Default)]
struct Cluster {
    pods: HashMap<String, Pod>,
    created: Vec<Pod>,
    deleted: Vec<String>,
}

/// In-memory cluster implementing `PodApi`.
pub struct FakePodApi {
    scenario: PodScenario,
    fail_create: Option<String>,
    panic_on_get: bool,
    logs: String,
    cluster: Mutex<Cluster>,
}

impl FakePodApi {
    pub fn new(scenario: PodScenario) -> Self {
        Self {
            scenario,
            fail_create: None,
            panic_on_get: false,
            logs: String::new(),
            cluster: Mutex::new(Cluster::default()),
        }
    }

    /// Every `create_pod` call fails with `reason`.
    pub fn fail_create(mut self, reason: &str) -> Self {
        self.fail_create = Some(reason.to_string());
        self
    }

    /// `get_pod` panics, killing whichever task polls it.
    pub fn panic_on_get(mut self) -> Self {
        self.panic_on_get = true;
        self
    }

    /// Log text returned for every pod.
    pub fn with_logs(mut self, logs: &str) -> Self {
        self.logs = logs.to_string();
        self
    }

    /// Let a running pod finish with `exit_code`.
    pub fn finish(&self, name: &str, exit_code: i32) {
        let mut cluster = self.cluster.lock().unwrap();
        if let Some(pod) = cluster.pods.get_mut(name) {
            let ip = pod.pod_ip().unwrap_or_default().to_string();
            pod.status = Some(terminated_status(&ip, exit_code));
        }
    }

    /// Pods submitted so far, as the executor built them.
    pub fn created(&self) -> Vec<Pod> {
        self.cluster.lock().unwrap().created.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.cluster.lock().unwrap().deleted.clone()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.cluster.lock().unwrap().pods.contains_key(name)
    }
}

fn terminated_status(ip: &str, exit_code: i32) -> PodStatus {
    let phase = if exit_code == 0 {
        PodPhase::Succeeded
    } else {
        PodPhase::Failed
    };
    PodStatusBuilder::new(phase)
        .ip(ip)
        .terminated(CONTAINER, exit_code)
        .build()
}

#[async_trait]
impl PodApi for FakePodApi {
    async fn create_pod(&self, _namespace: &str, pod: &Pod) -> Result<Pod> {
        if let Some(reason) = &self.fail_create {
            return Err(ExecError::ClusterApi(reason.clone()));
        }

        let mut stored = pod.clone();
        stored.status = Some(match &self.scenario {
            PodScenario::Run { ip } => PodStatusBuilder::new(PodPhase::Running).ip(ip).build(),
            PodScenario::Exit { ip, exit_code } => terminated_status(ip, *exit_code),
            PodScenario::StayPending => PodStatusBuilder::new(PodPhase::Pending)
                .reason("Unschedulable")
                .build(),
        });

        let mut cluster = self.cluster.lock().unwrap();
        cluster.created.push(pod.clone());
        cluster.pods.insert(pod.metadata.name.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_pod(&self, _namespace: &str, name: &str) -> Result<Option<Pod>> {
        if self.panic_on_get {
            panic!("fake cluster: get_pod({name}) panicked");
        }
        Ok(self.cluster.lock().unwrap().pods.get(name).cloned())
    }

    async fn delete_pod(&self, _namespace: &str, name: &str) -> Result<()> {
        let mut cluster = self.cluster.lock().unwrap();
        cluster.pods.remove(name);
        cluster.deleted.push(name.to_string());
        Ok(())
    }

    async fn pod_logs(&self, _namespace: &str, _name: &str, _container: &str) -> Result<String> {
        Ok(self.logs.clone())
    }
}
