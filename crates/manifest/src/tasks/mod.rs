//! Tasks that make up the manifest stages.

mod check_application;
mod deploy;
mod monitor;
mod operation;
mod patch;
mod promote;
mod resolve;
mod wait_stable;

pub use check_application::CheckIfApplicationExistsForManifestTask;
pub use deploy::DeployManifestTask;
pub use monitor::{MonitorDeployManifestTask, MonitorKatoTask};
pub use operation::ManifestOperationTask;
pub use patch::PatchManifestTask;
pub use promote::PromoteManifestKatoOutputsTask;
pub use resolve::{ResolveDeploySourceManifestTask, ResolvePatchSourceManifestTask};
pub use wait_stable::{UpdateManifestWaitForStableTask, WaitForManifestStableTask};

use clouddriver::{ClouddriverError, KatoService, TaskId};
use pipeline::execution::TaskResultBuilder;
use pipeline::{ExecutionStatus, StageExecution, TaskResult};
use serde_json::{json, Map, Value};
use tracing::info;

/// Context key holding the id of the last submitted Kato task.
pub const LAST_TASK_ID: &str = "kato.last.task.id";
/// Set when the monitor should wait for result objects before succeeding.
pub const RESULT_EXPECTED: &str = "kato.result.expected";
/// Every Kato task observed for the stage.
pub const KATO_TASKS: &str = "kato.tasks";

/// Submit one operation to Kato.
async fn submit_operation(
    kato: &dyn KatoService,
    stage: &StageExecution,
    cloud_provider: &str,
    operation: &str,
    payload: Map<String, Value>,
) -> Result<TaskId, ClouddriverError> {
    let mut request = Map::new();
    request.insert(operation.to_string(), Value::Object(payload));
    let task_id = kato
        .request_operations(cloud_provider, &[Value::Object(request)])
        .await?;
    info!(
        stage_id = %stage.id,
        operation,
        kato_task_id = %task_id.id,
        "Submitted operation"
    );
    Ok(task_id)
}

/// Result of a successful submission, pointing the monitor at `task_id`.
fn submitted(task_id: &TaskId) -> TaskResultBuilder {
    TaskResult::builder(ExecutionStatus::Succeeded)
        .context_entry(LAST_TASK_ID, json!({ "id": task_id.id }))
}

/// The account a stage operates on.
fn stage_account(stage: &StageExecution) -> Option<&str> {
    ["account", "accountName", "credentials", "deploy.account.name"]
        .into_iter()
        .find_map(|key| stage.context_str(key).filter(|account| !account.is_empty()))
}

fn cloud_provider(stage: &StageExecution) -> &str {
    stage
        .context_str("cloudProvider")
        .unwrap_or(crate::context::DEFAULT_CLOUD_PROVIDER)
}

fn context_i64(stage: &StageExecution, key: &str) -> i64 {
    stage.context.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn context_flag(stage: &StageExecution, key: &str) -> bool {
    stage.context.get(key).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn stage_with(context: Value) -> StageExecution {
        let Value::Object(map) = context else {
            return StageExecution::new("deployManifest", Map::new());
        };
        StageExecution::new("deployManifest", map)
    }

    #[test]
    fn test_stage_account_skips_empty_keys() {
        let stage = stage_with(json!({"account": "", "accountName": "k8s"}));
        assert_eq!(stage_account(&stage), Some("k8s"));
    }

    #[test]
    fn test_stage_account_fallback_order() {
        let stage = stage_with(json!({"credentials": "creds", "accountName": "named"}));
        assert_eq!(stage_account(&stage), Some("named"));

        let stage = stage_with(json!({"account": "", "credentials": "creds"}));
        assert_eq!(stage_account(&stage), Some("creds"));

        let stage = stage_with(json!({"account": "", "accountName": ""}));
        assert_eq!(stage_account(&stage), None);
    }
}
