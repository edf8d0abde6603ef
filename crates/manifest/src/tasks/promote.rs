use async_trait::async_trait;
use pipeline::{ExecutionStatus, StageExecution, Task, TaskError, TaskResult};
use serde_json::Value;
use tracing::debug;

use super::KATO_TASKS;

const PROMOTED_KEYS: [&str; 4] = [
    "manifests",
    "manifestNamesByNamespace",
    "boundArtifacts",
    "createdArtifacts",
];

/// Copies what Clouddriver reported about the deploy into stage outputs.
///
/// Each value lands in `outputs` under its own key and in the context under
/// `outputs.<key>`; created artifacts are also published as `artifacts` for
/// downstream binding.
pub struct PromoteManifestKatoOutputsTask;

impl PromoteManifestKatoOutputsTask {
    pub const TASK_NAME: &'static str = "promoteOutputs";

    pub fn new() -> Self {
        Self
    }
}

impl Default for PromoteManifestKatoOutputsTask {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Task for PromoteManifestKatoOutputsTask {
    fn name(&self) -> &'static str {
        Self::TASK_NAME
    }

    async fn execute(&self, stage: &StageExecution) -> Result<TaskResult, TaskError> {
        let result_objects: Vec<&Value> = stage
            .context
            .get(KATO_TASKS)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|task| task.get("resultObjects").and_then(Value::as_array))
            .flatten()
            .collect();

        let mut result = TaskResult::builder(ExecutionStatus::Succeeded);
        for key in PROMOTED_KEYS {
            let Some(value) = first_value(&result_objects, key) else {
                continue;
            };
            debug!(stage_id = %stage.id, key, "Promoting Kato output");
            if key == "createdArtifacts" {
                result = result
                    .output("artifacts", value.clone())
                    .context_entry("outputs.artifacts", value.clone());
            }
            result = result
                .output(key, value.clone())
                .context_entry(format!("outputs.{key}"), value.clone());
        }
        Ok(result.build())
    }
}

fn first_value<'a>(objects: &[&'a Value], key: &str) -> Option<&'a Value> {
    objects
        .iter()
        .find_map(|object| object.get(key).filter(|value| !value.is_null()))
}
