use std::sync::Arc;

use async_trait::async_trait;
use clouddriver::Front50Service;
use pipeline::{DynamicConfig, ExecutionStatus, StageExecution, Task, TaskError, TaskResult};
use serde_json::Value;
use tracing::{info, warn};

/// Fails the stage early when the target application is unknown to Front50.
pub struct CheckIfApplicationExistsForManifestTask {
    front50: Arc<dyn Front50Service>,
    config: Arc<dyn DynamicConfig>,
}

impl CheckIfApplicationExistsForManifestTask {
    pub const TASK_NAME: &'static str = "checkIfApplicationExistsForManifest";
    const ENABLED_FLAG: &'static str = "tasks.check-if-application-exists";

    pub fn new(front50: Arc<dyn Front50Service>, config: Arc<dyn DynamicConfig>) -> Self {
        Self { front50, config }
    }

    fn application_name(stage: &StageExecution) -> &str {
        stage
            .context
            .get("moniker")
            .and_then(|moniker| moniker.get("app"))
            .and_then(Value::as_str)
            .filter(|app| !app.is_empty())
            .unwrap_or_else(|| stage.application())
    }
}

#[async_trait]
impl Task for CheckIfApplicationExistsForManifestTask {
    fn name(&self) -> &'static str {
        Self::TASK_NAME
    }

    async fn execute(&self, stage: &StageExecution) -> Result<TaskResult, TaskError> {
        if !self.config.is_enabled(Self::ENABLED_FLAG, true) {
            info!(stage_id = %stage.id, "Application existence check disabled");
            return Ok(TaskResult::of(ExecutionStatus::Succeeded));
        }

        let application = Self::application_name(stage);
        if application.is_empty() {
            return Err(TaskError::Validation(
                "No application name found for the manifest".into(),
            ));
        }

        match self.front50.get_application(application).await? {
            Some(_) => {
                info!(stage_id = %stage.id, application, "Application exists");
                Ok(TaskResult::of(ExecutionStatus::Succeeded))
            }
            None => {
                warn!(stage_id = %stage.id, application, "Application not found in Front50");
                Err(TaskError::Validation(format!(
                    "Application '{application}' does not exist"
                )))
            }
        }
    }
}
