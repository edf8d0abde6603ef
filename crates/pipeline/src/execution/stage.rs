//! Stage and task execution records.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{ExecutionStatus, TaskResult, Trigger};

/// Execution-level data every stage can see.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub application: String,
    #[serde(default)]
    pub trigger: Trigger,
    /// Upstream stages, nearest first.
    #[serde(default)]
    pub ancestors: Vec<StageSnapshot>,
}

/// Read-only copy of an upstream stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSnapshot {
    pub id: String,
    #[serde(default)]
    pub ref_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub stage_type: String,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub outputs: Map<String, Value>,
}

impl From<&StageExecution> for StageSnapshot {
    fn from(stage: &StageExecution) -> Self {
        Self {
            id: stage.id.clone(),
            ref_id: stage.ref_id.clone(),
            name: stage.name.clone(),
            stage_type: stage.stage_type.clone(),
            status: stage.status,
            context: stage.context.clone(),
            outputs: stage.outputs.clone(),
        }
    }
}

/// Where a synthetic stage runs relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyntheticStageOwner {
    StageBefore,
    StageAfter,
}

/// A single task within a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecution {
    pub id: String,
    pub name: String,
    pub implementing_class: String,
    #[serde(default)]
    pub status: ExecutionStatus,
    /// Epoch millis.
    #[serde(default)]
    pub start_time: Option<i64>,
    /// Epoch millis.
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub stage_start: bool,
    #[serde(default)]
    pub stage_end: bool,
}

impl TaskExecution {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        implementing_class: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            implementing_class: implementing_class.into(),
            status: ExecutionStatus::NotStarted,
            start_time: None,
            end_time: None,
            stage_start: false,
            stage_end: false,
        }
    }
}

/// A stage: an ordered list of tasks sharing a mutable context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageExecution {
    pub id: String,
    #[serde(default)]
    pub ref_id: String,
    #[serde(rename = "type")]
    pub stage_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub outputs: Map<String, Value>,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default)]
    pub tasks: Vec<TaskExecution>,
    #[serde(default)]
    pub requisite_stage_ref_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_stage_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthetic_stage_owner: Option<SyntheticStageOwner>,
    /// Epoch millis.
    #[serde(default)]
    pub start_time: Option<i64>,
    /// Epoch millis.
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub execution: ExecutionInfo,
}

impl StageExecution {
    /// Create a stage of `stage_type` with a fresh id.
    #[must_use]
    pub fn new(stage_type: impl Into<String>, context: Map<String, Value>) -> Self {
        let stage_type = stage_type.into();
        Self {
            id: Uuid::new_v4().to_string(),
            ref_id: String::new(),
            name: stage_type.clone(),
            stage_type,
            context,
            outputs: Map::new(),
            status: ExecutionStatus::NotStarted,
            tasks: Vec::new(),
            requisite_stage_ref_ids: Vec::new(),
            parent_stage_id: None,
            synthetic_stage_owner: None,
            start_time: None,
            end_time: None,
            execution: ExecutionInfo::default(),
        }
    }

    /// Create a synthetic child stage that shares the parent's execution data.
    #[must_use]
    pub fn synthetic(
        parent: &StageExecution,
        stage_type: impl Into<String>,
        name: impl Into<String>,
        context: Map<String, Value>,
        owner: SyntheticStageOwner,
    ) -> Self {
        let mut stage = Self::new(stage_type, context);
        stage.name = name.into();
        stage.parent_stage_id = Some(parent.id.clone());
        stage.synthetic_stage_owner = Some(owner);
        stage.execution = parent.execution.clone();
        stage
    }

    #[must_use]
    pub fn with_ref_id(mut self, ref_id: impl Into<String>) -> Self {
        self.ref_id = ref_id.into();
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionInfo) -> Self {
        self.execution = execution;
        self
    }

    /// Deserialize the context into a typed view.
    pub fn context_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.context.clone()))
    }

    /// String value of a context key.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }

    /// Apply a task result to this stage.
    pub fn merge_result(&mut self, result: &TaskResult) {
        for (key, value) in &result.context {
            self.context.insert(key.clone(), value.clone());
        }
        for (key, value) in &result.outputs {
            self.outputs.insert(key.clone(), value.clone());
        }
    }

    pub fn task_by_name(&self, name: &str) -> Option<&TaskExecution> {
        self.tasks.iter().find(|task| task.name == name)
    }

    /// The first task that is still running.
    pub fn current_task(&self) -> Option<&TaskExecution> {
        self.tasks
            .iter()
            .find(|task| task.status == ExecutionStatus::Running)
    }

    pub fn application(&self) -> &str {
        &self.execution.application
    }

    pub fn trigger(&self) -> &Trigger {
        &self.execution.trigger
    }

    pub fn ancestors(&self) -> &[StageSnapshot] {
        &self.execution.ancestors
    }

    /// Values of `key` in ancestor outputs, nearest ancestor first.
    pub fn ancestor_outputs(&self, key: &str) -> Vec<&Value> {
        self.execution
            .ancestors
            .iter()
            .filter_map(|ancestor| ancestor.outputs.get(key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_merge_result_overwrites_without_removing() {
        let mut stage = StageExecution::new("deployManifest", map(json!({"a": 1, "b": 2})));
        stage.outputs.insert("keep".into(), json!(true));

        let result = TaskResult::builder(ExecutionStatus::Succeeded)
            .context_entry("b", 3)
            .output("manifests", json!([{"kind": "Pod"}]))
            .build();
        stage.merge_result(&result);

        assert_eq!(stage.context["a"], json!(1));
        assert_eq!(stage.context["b"], json!(3));
        assert_eq!(stage.outputs["keep"], json!(true));
        assert_eq!(stage.outputs["manifests"], json!([{"kind": "Pod"}]));
    }

    #[test]
    fn test_synthetic_stage_inherits_execution() {
        let mut parent = StageExecution::new("deployManifest", Map::new());
        parent.execution.application = "app".into();

        let child = StageExecution::synthetic(
            &parent,
            "disableManifest",
            "Disable old",
            Map::new(),
            SyntheticStageOwner::StageAfter,
        );

        assert_eq!(child.parent_stage_id.as_deref(), Some(parent.id.as_str()));
        assert_eq!(child.application(), "app");
        assert_ne!(child.id, parent.id);
    }

    #[test]
    fn test_ancestor_outputs_nearest_first() {
        let mut stage = StageExecution::new("deployManifest", Map::new());
        stage.execution.ancestors = vec![
            StageSnapshot {
                id: "2".into(),
                outputs: map(json!({"artifacts": ["near"]})),
                ..StageSnapshot::default()
            },
            StageSnapshot {
                id: "1".into(),
                outputs: map(json!({"artifacts": ["far"]})),
                ..StageSnapshot::default()
            },
        ];

        let found = stage.ancestor_outputs("artifacts");
        assert_eq!(found, vec![&json!(["near"]), &json!(["far"])]);
    }

    #[test]
    fn test_stage_deserializes_from_camel_case() {
        let stage: StageExecution = serde_json::from_value(json!({
            "id": "abc",
            "refId": "1",
            "type": "deployManifest",
            "requisiteStageRefIds": ["0"],
            "context": {"account": "k8s"}
        }))
        .unwrap();

        assert_eq!(stage.ref_id, "1");
        assert_eq!(stage.requisite_stage_ref_ids, vec!["0"]);
        assert_eq!(stage.context_str("account"), Some("k8s"));
        assert_eq!(stage.status, ExecutionStatus::NotStarted);
    }
}
