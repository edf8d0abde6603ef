use std::sync::Arc;

use async_trait::async_trait;
use clouddriver::KatoService;
use pipeline::{StageExecution, Task, TaskError, TaskResult};

use super::{cloud_provider, submit_operation, submitted};
use crate::context::{DeleteManifestContext, ManifestTarget};
use crate::error::ManifestError;

/// Submits a single Kato operation built from the stage context as-is.
pub struct ManifestOperationTask {
    kato: Arc<dyn KatoService>,
    operation: &'static str,
}

impl ManifestOperationTask {
    pub const DELETE: &'static str = "deleteManifest";
    pub const DISABLE: &'static str = "disableManifest";

    pub fn delete(kato: Arc<dyn KatoService>) -> Self {
        Self {
            kato,
            operation: Self::DELETE,
        }
    }

    pub fn disable(kato: Arc<dyn KatoService>) -> Self {
        Self {
            kato,
            operation: Self::DISABLE,
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    fn validate(&self, stage: &StageExecution) -> Result<(), ManifestError> {
        let checked = if self.operation == Self::DELETE {
            stage.context_as::<DeleteManifestContext>()?.validate()
        } else {
            stage.context_as::<ManifestTarget>()?.validate()
        };
        checked.map_err(ManifestError::Validation)
    }
}

#[async_trait]
impl Task for ManifestOperationTask {
    fn name(&self) -> &'static str {
        self.operation
    }

    async fn execute(&self, stage: &StageExecution) -> Result<TaskResult, TaskError> {
        self.validate(stage)?;
        let task_id = submit_operation(
            self.kato.as_ref(),
            stage,
            cloud_provider(stage),
            self.operation,
            stage.context.clone(),
        )
        .await?;
        Ok(submitted(&task_id).build())
    }
}
