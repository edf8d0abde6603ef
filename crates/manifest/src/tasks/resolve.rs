use async_trait::async_trait;
use pipeline::{ExecutionStatus, StageExecution, Task, TaskError, TaskResult};
use serde_json::Value;
use tracing::info;

use crate::context::{DeployManifestContext, PatchManifestContext};
use crate::evaluator::{EvaluatedManifests, ManifestEvaluator};

/// Resolves deploy manifests once so later tasks see plain text manifests.
pub struct ResolveDeploySourceManifestTask {
    evaluator: ManifestEvaluator,
}

impl ResolveDeploySourceManifestTask {
    pub const TASK_NAME: &'static str = "resolveDeploySourceManifest";

    pub fn new(evaluator: ManifestEvaluator) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl Task for ResolveDeploySourceManifestTask {
    fn name(&self) -> &'static str {
        Self::TASK_NAME
    }

    async fn execute(&self, stage: &StageExecution) -> Result<TaskResult, TaskError> {
        let context: DeployManifestContext = stage.context_as()?;
        let evaluated = self.evaluator.evaluate(stage, &context).await?;
        info!(
            stage_id = %stage.id,
            manifests = evaluated.manifests.len(),
            "Resolved deploy manifests"
        );
        resolved(&evaluated, "manifests", Value::Array(evaluated.manifests.clone()))
    }
}

/// Resolves patch bodies once so the patch task sees plain text bodies.
pub struct ResolvePatchSourceManifestTask {
    evaluator: ManifestEvaluator,
}

impl ResolvePatchSourceManifestTask {
    pub const TASK_NAME: &'static str = "resolvePatchSourceManifest";

    pub fn new(evaluator: ManifestEvaluator) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl Task for ResolvePatchSourceManifestTask {
    fn name(&self) -> &'static str {
        Self::TASK_NAME
    }

    async fn execute(&self, stage: &StageExecution) -> Result<TaskResult, TaskError> {
        let context: PatchManifestContext = stage.context_as()?;
        let evaluated = self.evaluator.evaluate(stage, &context).await?;
        info!(
            stage_id = %stage.id,
            patches = evaluated.manifests.len(),
            "Resolved patch body"
        );
        resolved(&evaluated, "patchBody", Value::Array(evaluated.manifests.clone()))
    }
}

fn resolved(
    evaluated: &EvaluatedManifests,
    key: &str,
    manifests: Value,
) -> Result<TaskResult, TaskError> {
    Ok(TaskResult::builder(ExecutionStatus::Succeeded)
        .context_entry(key, manifests)
        .context_entry(
            "requiredArtifacts",
            serde_json::to_value(&evaluated.required_artifacts)?,
        )
        .context_entry(
            "optionalArtifacts",
            serde_json::to_value(&evaluated.optional_artifacts)?,
        )
        .context_entry("source", "text")
        .context_entry("skipExpressionEvaluation", true)
        .build())
}
