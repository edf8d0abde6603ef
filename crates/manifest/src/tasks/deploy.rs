use std::sync::Arc;

use async_trait::async_trait;
use clouddriver::KatoService;
use pipeline::{StageExecution, Task, TaskError, TaskResult};
use serde_json::{Map, Value};
use tracing::debug;

use super::{submit_operation, submitted, RESULT_EXPECTED};
use crate::context::DeployManifestContext;
use crate::error::ManifestError;
use crate::evaluator::ManifestEvaluator;

/// Submits the `deployManifest` operation.
pub struct DeployManifestTask {
    kato: Arc<dyn KatoService>,
    evaluator: ManifestEvaluator,
}

impl DeployManifestTask {
    pub const TASK_NAME: &'static str = "deployManifest";

    pub fn new(kato: Arc<dyn KatoService>, evaluator: ManifestEvaluator) -> Self {
        Self { kato, evaluator }
    }
}

#[async_trait]
impl Task for DeployManifestTask {
    fn name(&self) -> &'static str {
        Self::TASK_NAME
    }

    async fn execute(&self, stage: &StageExecution) -> Result<TaskResult, TaskError> {
        let context: DeployManifestContext = stage.context_as()?;
        let evaluated = self.evaluator.evaluate(stage, &context).await?;
        if evaluated.manifests.is_empty() {
            return Err(ManifestError::Validation(
                "The deploy manifest stage requires at least one manifest".into(),
            )
            .into());
        }

        let manifests = match context.namespace_override.as_deref() {
            Some(namespace) if !namespace.is_empty() => {
                override_namespace(evaluated.manifests, namespace)
            }
            _ => evaluated.manifests,
        };

        let mut payload: Map<String, Value> = stage.context.clone();
        payload.insert("manifests".into(), Value::Array(manifests));
        payload.insert(
            "requiredArtifacts".into(),
            serde_json::to_value(&evaluated.required_artifacts)?,
        );
        payload.insert(
            "optionalArtifacts".into(),
            serde_json::to_value(&evaluated.optional_artifacts)?,
        );
        payload.insert("source".into(), Value::String("text".into()));

        let task_id = submit_operation(
            self.kato.as_ref(),
            stage,
            &context.cloud_provider,
            Self::TASK_NAME,
            payload,
        )
        .await?;

        let mut result = submitted(&task_id).context_entry(RESULT_EXPECTED, true);
        if let Some(account) = context.account {
            result = result.context_entry("deploy.account.name", account);
        }
        Ok(result.build())
    }
}

/// Set `metadata.namespace` on every manifest.
fn override_namespace(manifests: Vec<Value>, namespace: &str) -> Vec<Value> {
    manifests
        .into_iter()
        .map(|mut manifest| {
            if let Some(object) = manifest.as_object_mut() {
                let metadata = object
                    .entry("metadata")
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Some(metadata) = metadata.as_object_mut() {
                    metadata.insert("namespace".into(), Value::String(namespace.to_string()));
                }
            }
            manifest
        })
        .inspect(|manifest| {
            debug!(
                name = ?manifest.pointer("/metadata/name"),
                namespace,
                "Applied namespace override"
            );
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_override_namespace_creates_metadata() {
        let manifests = override_namespace(
            vec![
                json!({"kind": "Deployment", "metadata": {"name": "web", "namespace": "dev"}}),
                json!({"kind": "ConfigMap"}),
            ],
            "prod",
        );
        assert_eq!(manifests[0]["metadata"]["namespace"], json!("prod"));
        assert_eq!(manifests[0]["metadata"]["name"], json!("web"));
        assert_eq!(manifests[1]["metadata"]["namespace"], json!("prod"));
    }
}
