// src/executor/kubernetes/model.rs

//! The subset of the core/v1 Pod object this executor reads and writes.
//!
//! Field names follow the API's JSON schema; unknown fields sent by the API
//! server are ignored on deserialization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::executor::TaskState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PodStatus>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_kind() -> String {
    "Pod".to_string()
}

impl Pod {
    pub fn new(metadata: ObjectMeta, spec: PodSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata,
            spec,
            status: None,
        }
    }

    pub fn phase(&self) -> PodPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    pub fn pod_ip(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.pod_ip.as_deref())
            .filter(|ip| !ip.is_empty())
    }

    /// Exit code of a terminated container, if the API reported one.
    pub fn exit_code(&self, container: &str) -> Option<i32> {
        self.status
            .as_ref()?
            .container_statuses
            .iter()
            .find(|cs| cs.name == container)?
            .state
            .as_ref()?
            .terminated
            .as_ref()
            .map(|t| t.exit_code)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<String>,
    #[serde(default)]
    pub host_network: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_grace_period_seconds: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,
}

/// Quantities are kept in their string form (`"500m"`, `"1073741824"`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

impl ResourceRequirements {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.limits.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default)]
    pub phase: PodPhase,
    #[serde(default, rename = "podIP", skip_serializing_if = "Option::is_none")]
    pub pod_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ContainerState>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminated: Option<ContainerStateTerminated>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStateTerminated {
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Pod lifecycle phase as reported by the API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl PodPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }

    /// `Unknown` usually means the node lost contact; the pod may still run.
    pub fn task_state(self) -> TaskState {
        if self.is_terminal() {
            TaskState::Terminated
        } else {
            TaskState::Running
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUNNING_POD: &str = r#"{
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "swan-1", "namespace": "default", "uid": "abc"},
        "spec": {"containers": [{"name": "swan", "image": "img", "command": ["sh", "-c", "true"]}]},
        "status": {
            "phase": "Running",
            "podIP": "10.1.2.3",
            "containerStatuses": [{"name": "swan", "state": {"running": {"startedAt": "now"}}}]
        }
    }"#;

    #[test]
    fn deserializes_api_server_pod() {
        let pod: Pod = serde_json::from_str(RUNNING_POD).unwrap();
        assert_eq!(pod.metadata.name, "swan-1");
        assert_eq!(pod.phase(), PodPhase::Running);
        assert_eq!(pod.pod_ip(), Some("10.1.2.3"));
        assert_eq!(pod.exit_code("swan"), None);
    }

    #[test]
    fn reads_terminated_exit_code() {
        let pod: Pod = serde_json::from_str(
            r#"{"metadata": {"name": "p"}, "status": {"phase": "Failed",
                "containerStatuses": [{"name": "c", "state": {"terminated": {"exitCode": 137, "reason": "OOMKilled"}}}]}}"#,
        )
        .unwrap();
        assert_eq!(pod.phase(), PodPhase::Failed);
        assert_eq!(pod.exit_code("c"), Some(137));
        assert_eq!(pod.exit_code("other"), None);
    }

    #[test]
    fn unknown_phase_strings_map_to_unknown() {
        let status: PodStatus = serde_json::from_str(r#"{"phase": "Evicted"}"#).unwrap();
        assert_eq!(status.phase, PodPhase::Unknown);
        assert_eq!(status.phase.task_state(), TaskState::Running);
    }

    #[test]
    fn phases_map_onto_task_states() {
        assert_eq!(PodPhase::Pending.task_state(), TaskState::Running);
        assert_eq!(PodPhase::Running.task_state(), TaskState::Running);
        assert_eq!(PodPhase::Succeeded.task_state(), TaskState::Terminated);
        assert_eq!(PodPhase::Failed.task_state(), TaskState::Terminated);
    }

    #[test]
    fn serializes_without_empty_optionals() {
        let pod = Pod::new(
            ObjectMeta {
                name: "p".into(),
                ..ObjectMeta::default()
            },
            PodSpec::default(),
        );
        let json = serde_json::to_value(&pod).unwrap();
        assert_eq!(json["apiVersion"], "v1");
        assert_eq!(json["kind"], "Pod");
        assert!(json.get("status").is_none());
        assert!(json["metadata"].get("labels").is_none());
    }
}
