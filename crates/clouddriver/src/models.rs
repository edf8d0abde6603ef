//! Wire models for Kato, Oort and Front50.

use pipeline::Artifact;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of a submitted Kato task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskId {
    pub id: String,
}

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Completion flags of a Kato task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KatoTaskStatus {
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub retryable: bool,
}

/// One line of a Kato task's history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHistory {
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub status: String,
}

/// A Kato task as reported by Clouddriver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KatoTask {
    pub id: String,
    #[serde(default)]
    pub status: KatoTaskStatus,
    #[serde(default)]
    pub history: Vec<TaskHistory>,
    #[serde(default)]
    pub result_objects: Vec<Value>,
}

impl KatoTask {
    /// Messages of `EXCEPTION` result objects.
    pub fn exception_messages(&self) -> Vec<String> {
        self.result_objects
            .iter()
            .filter(|object| object.get("type").and_then(Value::as_str) == Some("EXCEPTION"))
            .filter_map(|object| object.get("message").and_then(Value::as_str))
            .map(ToString::to_string)
            .collect()
    }
}

/// The Clouddriver instance that owns a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOwner {
    pub name: String,
}

/// A boolean manifest condition with an optional explanation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub state: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn new(state: bool, message: Option<&str>) -> Self {
        Self {
            state,
            message: message.map(ToString::to_string),
        }
    }
}

/// Rollout status of a deployed manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestStatus {
    #[serde(default)]
    pub stable: Condition,
    #[serde(default)]
    pub failed: Condition,
    #[serde(default)]
    pub paused: Condition,
    #[serde(default)]
    pub available: Condition,
}

/// Warning attached to a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    #[serde(rename = "type", default)]
    pub warning_type: String,
    #[serde(default)]
    pub message: String,
}

/// Naming metadata Clouddriver derives from a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moniker {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
}

/// A live manifest with its status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub location: String,
    /// `<kind> <name>`, e.g. `replicaSet my-rs-v000`.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub manifest: Value,
    #[serde(default)]
    pub status: ManifestStatus,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moniker: Option<Moniker>,
}

impl Manifest {
    /// `<account>/<location>/<name>` for messages.
    pub fn full_resource_name(&self) -> String {
        format!("{}/{}/{}", self.account, self.location, self.name)
    }

    /// `status.availableReplicas` of the underlying resource, if reported.
    #[allow(clippy::cast_possible_truncation)]
    pub fn available_replicas(&self) -> Option<i64> {
        let replicas = self.manifest.pointer("/status/availableReplicas")?;
        replicas
            .as_i64()
            .or_else(|| replicas.as_f64().map(|count| count as i64))
    }
}

/// Location of a manifest in a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestCoordinates {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

impl ManifestCoordinates {
    /// `<kind> <name>` as used in operation contexts.
    pub fn full_resource_name(&self) -> String {
        format!("{} {}", self.kind, self.name)
    }
}

/// Application metadata from Front50.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kato_task_exception_messages() {
        let task: KatoTask = serde_json::from_value(json!({
            "id": "42",
            "status": {"completed": true, "failed": true, "retryable": false},
            "history": [{"phase": "ORCHESTRATION", "status": "Initializing"}],
            "resultObjects": [
                {"type": "EXCEPTION", "message": "forbidden: cannot create pods"},
                {"manifests": []}
            ]
        }))
        .unwrap();

        assert!(task.status.failed);
        assert_eq!(task.history[0].phase, "ORCHESTRATION");
        assert_eq!(
            task.exception_messages(),
            vec!["forbidden: cannot create pods"]
        );
    }

    #[test]
    fn test_manifest_defaults_and_helpers() {
        let manifest: Manifest = serde_json::from_value(json!({
            "account": "k8s",
            "location": "default",
            "name": "replicaSet web-v001",
            "manifest": {"kind": "ReplicaSet", "status": {"availableReplicas": 0}},
            "status": {"stable": {"state": true}}
        }))
        .unwrap();

        assert!(manifest.status.stable.state);
        assert!(!manifest.status.failed.state);
        assert_eq!(manifest.available_replicas(), Some(0));
        assert_eq!(manifest.full_resource_name(), "k8s/default/replicaSet web-v001");
    }
}
