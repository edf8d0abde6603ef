use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clouddriver::OortService;
use pipeline::execution::{exception_details, EXCEPTION};
use pipeline::{
    DynamicConfig, ExecutionStatus, RetryPolicy, StageExecution, Task, TaskError, TaskResult,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::stage_account;

const MANIFEST_NAMES_BY_NAMESPACE: &str = "outputs.manifestNamesByNamespace";
const STABLE_MANIFESTS: &str = "stableManifests";
const FAILED_MANIFESTS: &str = "failedManifests";
const WARNINGS: &str = "warnings";
const MESSAGES: &str = "messages";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const POLICY: RetryPolicy = RetryPolicy::new(Duration::from_secs(5), DEFAULT_TIMEOUT);

type ManifestsByNamespace = BTreeMap<String, Vec<String>>;

/// Shared stability check over `namespace -> [manifest name]`.
struct StabilityCheck<'a> {
    oort: &'a dyn OortService,
    stage: &'a StageExecution,
    account: &'a str,
    stable: Vec<Value>,
    failed: Vec<Value>,
    warnings: Vec<Value>,
    messages: Vec<String>,
    failures: Vec<String>,
    all_stable: bool,
    any_unknown: bool,
}

impl<'a> StabilityCheck<'a> {
    fn new(oort: &'a dyn OortService, stage: &'a StageExecution, account: &'a str) -> Self {
        let previous = |key: &str| -> Vec<Value> {
            stage
                .context
                .get(key)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };
        Self {
            oort,
            stage,
            account,
            stable: previous(STABLE_MANIFESTS),
            failed: previous(FAILED_MANIFESTS),
            warnings: previous(WARNINGS),
            messages: Vec::new(),
            failures: Vec::new(),
            all_stable: true,
            any_unknown: false,
        }
    }

    async fn check(mut self, manifests: &ManifestsByNamespace) -> Result<TaskResult, TaskError> {
        for (namespace, names) in manifests {
            for name in names {
                self.check_manifest(namespace, name).await?;
            }
        }
        Ok(self.into_result())
    }

    async fn check_manifest(&mut self, namespace: &str, name: &str) -> Result<(), TaskError> {
        let manifest = match self.oort.get_manifest(self.account, namespace, name, false).await {
            Ok(manifest) => manifest,
            Err(err) if err.is_not_found() => {
                self.all_stable = false;
                self.any_unknown = true;
                self.messages
                    .push(format!("{name}: waiting for manifest to be reported"));
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let entry = json!({ "manifestName": name, "location": namespace });
        let status = &manifest.status;
        if status.stable.state {
            push_unique(&mut self.stable, entry.clone());
        } else {
            self.all_stable = false;
            self.messages
                .push(format!("{name}: waiting for manifest to stabilize"));
        }

        if status.failed.state {
            push_unique(&mut self.failed, entry);
            let detail = status.failed.message.as_deref().unwrap_or("manifest failed");
            self.failures.push(format!(
                "{}/{namespace}/{name}: {detail}",
                self.account
            ));
        }

        for warning in &manifest.warnings {
            push_unique(&mut self.warnings, serde_json::to_value(warning)?);
        }
        Ok(())
    }

    fn into_result(self) -> TaskResult {
        let status = if !self.failures.is_empty() && !self.any_unknown {
            ExecutionStatus::Terminal
        } else if self.all_stable {
            ExecutionStatus::Succeeded
        } else {
            ExecutionStatus::Running
        };

        let mut result = TaskResult::builder(status)
            .context_entry(STABLE_MANIFESTS, self.stable)
            .context_entry(FAILED_MANIFESTS, self.failed)
            .context_entry(WARNINGS, self.warnings)
            .context_entry(MESSAGES, json!(self.messages));

        if status == ExecutionStatus::Terminal {
            warn!(stage_id = %self.stage.id, failures = ?self.failures, "Manifests failed to stabilize");
            result = result.context_entry(
                EXCEPTION,
                exception_details(&self.failures.join("\n"), &self.failures),
            );
        } else {
            info!(
                stage_id = %self.stage.id,
                status = %status,
                waiting = self.messages.len(),
                "Checked manifest stability"
            );
        }
        result.build()
    }
}

fn push_unique(values: &mut Vec<Value>, value: Value) {
    if !values.contains(&value) {
        values.push(value);
    }
}

fn manifests_by_namespace(stage: &StageExecution) -> Result<Option<ManifestsByNamespace>, TaskError> {
    stage
        .context
        .get(MANIFEST_NAMES_BY_NAMESPACE)
        .filter(|value| !value.is_null())
        .map(|value| serde_json::from_value(value.clone()))
        .transpose()
        .map_err(TaskError::from)
}

fn require_account(stage: &StageExecution) -> Result<&str, TaskError> {
    stage_account(stage).ok_or_else(|| {
        TaskError::Validation("No account found to check manifest stability".into())
    })
}

/// Waits for every manifest reported by the deploy to become stable.
pub struct WaitForManifestStableTask {
    oort: Arc<dyn OortService>,
}

impl WaitForManifestStableTask {
    pub const TASK_NAME: &'static str = "waitForManifestToStabilize";

    pub fn new(oort: Arc<dyn OortService>) -> Self {
        Self { oort }
    }
}

#[async_trait]
impl Task for WaitForManifestStableTask {
    fn name(&self) -> &'static str {
        Self::TASK_NAME
    }

    async fn execute(&self, stage: &StageExecution) -> Result<TaskResult, TaskError> {
        let manifests = manifests_by_namespace(stage)?.unwrap_or_default();
        let account = require_account(stage)?;
        StabilityCheck::new(self.oort.as_ref(), stage, account)
            .check(&manifests)
            .await
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        Some(POLICY)
    }
}

/// Waits for a patched or disabled manifest to become stable.
///
/// Falls back to the stage's own `manifestName` in `location` when the
/// operation reported no manifest names.
pub struct UpdateManifestWaitForStableTask {
    oort: Arc<dyn OortService>,
    config: Arc<dyn DynamicConfig>,
}

impl UpdateManifestWaitForStableTask {
    pub const TASK_NAME: &'static str = "waitForManifestToStabilizeAfterUpdate";
    const TIMEOUT_KEY: &'static str = "tasks.wait-for-manifest-stable.timeout-ms";

    pub fn new(oort: Arc<dyn OortService>, config: Arc<dyn DynamicConfig>) -> Self {
        Self { oort, config }
    }
}

#[async_trait]
impl Task for UpdateManifestWaitForStableTask {
    fn name(&self) -> &'static str {
        Self::TASK_NAME
    }

    async fn execute(&self, stage: &StageExecution) -> Result<TaskResult, TaskError> {
        let manifests = match manifests_by_namespace(stage)? {
            Some(manifests) => manifests,
            None => {
                let location = stage.context_str("location").unwrap_or_default();
                let name = stage.context_str("manifestName").ok_or_else(|| {
                    TaskError::Validation("No manifest name to wait on".into())
                })?;
                BTreeMap::from([(location.to_string(), vec![name.to_string()])])
            }
        };
        let account = require_account(stage)?;
        StabilityCheck::new(self.oort.as_ref(), stage, account)
            .check(&manifests)
            .await
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        Some(POLICY)
    }

    fn dynamic_timeout(&self, _stage: &StageExecution) -> Option<Duration> {
        let default_ms = i64::try_from(DEFAULT_TIMEOUT.as_millis()).unwrap_or(i64::MAX);
        let millis = self.config.get_i64(Self::TIMEOUT_KEY, default_ms);
        Some(
            u64::try_from(millis)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_TIMEOUT),
        )
    }
}
