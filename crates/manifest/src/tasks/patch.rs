use std::sync::Arc;

use async_trait::async_trait;
use clouddriver::KatoService;
use pipeline::{ExecutionStatus, StageExecution, Task, TaskError, TaskResult};
use serde_json::Value;
use tracing::info;

use super::{submit_operation, submitted};
use crate::context::{MergeStrategy, PatchManifestContext};
use crate::error::ManifestError;
use crate::evaluator::ManifestEvaluator;

/// Submits the `patchManifest` operation.
pub struct PatchManifestTask {
    kato: Arc<dyn KatoService>,
    evaluator: ManifestEvaluator,
}

impl PatchManifestTask {
    pub const TASK_NAME: &'static str = "patchManifest";

    pub fn new(kato: Arc<dyn KatoService>, evaluator: ManifestEvaluator) -> Self {
        Self { kato, evaluator }
    }
}

#[async_trait]
impl Task for PatchManifestTask {
    fn name(&self) -> &'static str {
        Self::TASK_NAME
    }

    async fn execute(&self, stage: &StageExecution) -> Result<TaskResult, TaskError> {
        let context: PatchManifestContext = stage.context_as()?;
        let evaluated = self.evaluator.evaluate(stage, &context).await?;

        let mut patches = evaluated.manifests;
        if patches.is_empty() {
            if context.allow_null_source {
                info!(stage_id = %stage.id, "Empty patch body allowed, nothing to patch");
                return Ok(TaskResult::of(ExecutionStatus::Succeeded));
            }
            return Err(ManifestError::Validation(
                "The patch manifest stage requires a valid patch body".into(),
            )
            .into());
        }

        let patch_body = if context.options.merge_strategy == MergeStrategy::Json {
            Value::Array(patches)
        } else if patches.len() == 1 {
            patches.remove(0)
        } else {
            return Err(ManifestError::Validation(
                "Only one patch object is valid when patching with strategic and merge patch strategies"
                    .into(),
            )
            .into());
        };

        let all_artifacts: Vec<_> = evaluated
            .required_artifacts
            .iter()
            .chain(&evaluated.optional_artifacts)
            .collect();

        let mut payload = stage.context.clone();
        payload.insert("patchBody".into(), patch_body);
        payload.insert("allArtifacts".into(), serde_json::to_value(&all_artifacts)?);
        payload.insert(
            "manifestArtifacts".into(),
            serde_json::to_value(&evaluated.required_artifacts)?,
        );
        payload.insert("source".into(), Value::String("text".into()));

        let task_id = submit_operation(
            self.kato.as_ref(),
            stage,
            &context.target.cloud_provider,
            Self::TASK_NAME,
            payload,
        )
        .await?;
        Ok(submitted(&task_id).build())
    }
}
