use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clouddriver::{KatoService, KatoTask, OortService};
use pipeline::execution::{exception_details, now_millis, EXCEPTION};
use pipeline::{
    DynamicConfig, ExecutionStatus, RetryPolicy, RetrySupport, StageExecution, Task, TaskError,
    TaskResult,
};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use super::{cloud_provider, context_flag, context_i64, KATO_TASKS, LAST_TASK_ID, RESULT_EXPECTED};

const NOT_FOUND_RETRY_COUNT: &str = "kato.task.notFoundRetryCount";
const TERMINAL_RETRY_COUNT: &str = "kato.task.terminalRetryCount";
const LAST_STATUS: &str = "kato.task.lastStatus";
const MAX_NOT_FOUND_RETRIES: i64 = 100;

const LOOKUP_ATTEMPTS: u32 = 3;
const LOOKUP_BACKOFF: Duration = Duration::from_millis(500);

const TERMINAL_RETRIES_KEY: &str = "tasks.monitor-kato-task.terminal-retries";
const DEFAULT_TERMINAL_RETRIES: i64 = 3;

const POLICY: RetryPolicy = RetryPolicy::new(Duration::from_secs(5), Duration::from_secs(60 * 60));

/// Polls the Kato task recorded under `kato.last.task.id` until it settles.
pub struct MonitorKatoTask {
    kato: Arc<dyn KatoService>,
    config: Arc<dyn DynamicConfig>,
    retry: RetrySupport,
}

/// One poll of a Kato task.
struct Poll {
    result: TaskResult,
    task: Option<KatoTask>,
}

impl MonitorKatoTask {
    pub const TASK_NAME: &'static str = "monitorKatoTask";

    pub fn new(kato: Arc<dyn KatoService>, config: Arc<dyn DynamicConfig>) -> Self {
        Self {
            kato,
            config,
            retry: RetrySupport::new(),
        }
    }

    async fn poll(&self, stage: &StageExecution) -> Result<Poll, TaskError> {
        let Some(task_id) = last_task_id(stage) else {
            info!(stage_id = %stage.id, "No Kato task to monitor");
            return Ok(Poll {
                result: TaskResult::of(ExecutionStatus::Succeeded),
                task: None,
            });
        };

        let lookup = self
            .retry
            .retry(
                || self.kato.lookup_task(task_id),
                LOOKUP_ATTEMPTS,
                LOOKUP_BACKOFF,
                false,
            )
            .await;

        let task = match lookup {
            Ok(task) => task,
            Err(err) if err.is_not_found() => {
                let misses = context_i64(stage, NOT_FOUND_RETRY_COUNT) + 1;
                if misses > MAX_NOT_FOUND_RETRIES {
                    return Err(TaskError::Remote {
                        message: format!("Kato task {task_id} could not be found"),
                        retryable: false,
                    });
                }
                warn!(stage_id = %stage.id, kato_task_id = task_id, misses, "Kato task not found yet");
                return Ok(Poll {
                    result: TaskResult::builder(ExecutionStatus::Running)
                        .context_entry(NOT_FOUND_RETRY_COUNT, misses)
                        .build(),
                    task: None,
                });
            }
            Err(err) => return Err(err.into()),
        };

        let mut context = Map::new();
        let status = if task.status.failed {
            self.failed_status(stage, &task, &mut context).await?
        } else if task.status.completed {
            if context_flag(stage, RESULT_EXPECTED) && task.result_objects.is_empty() {
                debug!(stage_id = %stage.id, kato_task_id = task_id, "Waiting for result objects");
                ExecutionStatus::Running
            } else {
                ExecutionStatus::Succeeded
            }
        } else {
            ExecutionStatus::Running
        };

        context.insert(KATO_TASKS.into(), record_task(stage, &task)?);
        context.insert(LAST_STATUS.into(), Value::String(status.as_str().into()));
        info!(
            stage_id = %stage.id,
            kato_task_id = task_id,
            status = %status,
            "Polled Kato task"
        );

        Ok(Poll {
            result: TaskResult::builder(status).context(context).build(),
            task: Some(task),
        })
    }

    async fn failed_status(
        &self,
        stage: &StageExecution,
        task: &KatoTask,
        context: &mut Map<String, Value>,
    ) -> Result<ExecutionStatus, TaskError> {
        if task.status.retryable {
            let retries = context_i64(stage, TERMINAL_RETRY_COUNT);
            let limit = self
                .config
                .get_i64(TERMINAL_RETRIES_KEY, DEFAULT_TERMINAL_RETRIES);
            if retries < limit {
                warn!(
                    stage_id = %stage.id,
                    kato_task_id = %task.id,
                    attempt = retries + 1,
                    "Resuming retryable Kato task"
                );
                self.kato.resume_task(&task.id).await?;
                context.insert(TERMINAL_RETRY_COUNT.into(), json!(retries + 1));
                return Ok(ExecutionStatus::Running);
            }
        }

        let errors = task.exception_messages();
        let message = errors
            .first()
            .cloned()
            .unwrap_or_else(|| format!("Kato task {} failed", task.id));
        error!(stage_id = %stage.id, kato_task_id = %task.id, error = %message, "Kato task failed");
        context.insert(EXCEPTION.into(), exception_details(&message, &errors));
        Ok(ExecutionStatus::Terminal)
    }
}

#[async_trait]
impl Task for MonitorKatoTask {
    fn name(&self) -> &'static str {
        Self::TASK_NAME
    }

    async fn execute(&self, stage: &StageExecution) -> Result<TaskResult, TaskError> {
        Ok(self.poll(stage).await?.result)
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        Some(POLICY)
    }
}

const RETRY_TASK_FLAG: &str = "tasks.monitor-kato-task.kubernetes.deploy-manifest.retry-task";
const MAX_FORCED_RETRIES_KEY: &str =
    "tasks.monitor-kato-task.kubernetes.deploy-manifest.maximum-forced-retries";
const MAX_INACTIVITY_KEY: &str =
    "tasks.monitor-kato-task.kubernetes.deploy-manifest.maximum-period-inactivity-ms";
const OWNER_ACCOUNT_KEY: &str = "tasks.monitor-kato-task.kubernetes.deploy-manifest.account";
const OWNER_NAMESPACE_KEY: &str = "tasks.monitor-kato-task.kubernetes.deploy-manifest.namespace";

const FORCED_RETRIES: &str = "kato.task.forcedRetries";
const FORCE_RETRY_FATAL_ERROR: &str = "kato.task.forceRetryFatalError";
const RETRIED_OPERATION: &str = "kato.task.retriedOperation";
const LAST_FORCED_RETRY: &str = "kato.task.lastForcedRetryTime";

/// Monitors a `deployManifest` Kato task and restarts it on another
/// Clouddriver instance when the instance that owned it has gone away.
pub struct MonitorDeployManifestTask {
    monitor: MonitorKatoTask,
    oort: Arc<dyn OortService>,
    config: Arc<dyn DynamicConfig>,
}

impl MonitorDeployManifestTask {
    pub const TASK_NAME: &'static str = "monitorDeployManifest";

    pub fn new(
        kato: Arc<dyn KatoService>,
        oort: Arc<dyn OortService>,
        config: Arc<dyn DynamicConfig>,
    ) -> Self {
        Self {
            monitor: MonitorKatoTask::new(kato, Arc::clone(&config)),
            oort,
            config,
        }
    }

    /// The operation replayed when the task is restarted.
    pub fn operation(stage: &StageExecution) -> Value {
        json!({ "deployManifest": stage.context })
    }

    /// Whether the task has been quiet long enough to check on its owner.
    fn inactive_for_too_long(&self, stage: &StageExecution) -> bool {
        let limit = self.config.get_i64(MAX_INACTIVITY_KEY, 300_000);
        let started = stage
            .task_by_name(Self::TASK_NAME)
            .and_then(|task| task.start_time);
        let last_retry = stage.context.get(LAST_FORCED_RETRY).and_then(Value::as_i64);
        match started.into_iter().chain(last_retry).max() {
            Some(since) => now_millis() - since > limit,
            None => false,
        }
    }

    async fn force_retry(&self, stage: &StageExecution, task_id: &str, result: &mut TaskResult) {
        if context_flag(stage, FORCE_RETRY_FATAL_ERROR) {
            debug!(stage_id = %stage.id, "Forced retry disabled after an earlier fatal error");
            return;
        }
        let forced = context_i64(stage, FORCED_RETRIES);
        if forced >= self.config.get_i64(MAX_FORCED_RETRIES_KEY, 3) {
            debug!(stage_id = %stage.id, forced, "Forced retries exhausted");
            return;
        }
        if !self.inactive_for_too_long(stage) {
            return;
        }

        let kato = &self.monitor.kato;
        let provider = cloud_provider(stage);
        let owner = match kato.lookup_task_owner(provider, task_id).await {
            Ok(owner) => owner,
            Err(err) => {
                error!(stage_id = %stage.id, kato_task_id = task_id, error = %err, "Failed to look up task owner");
                result.context.insert(FORCE_RETRY_FATAL_ERROR.into(), Value::Bool(true));
                return;
            }
        };

        let account = self.config.get_string(OWNER_ACCOUNT_KEY, "");
        let namespace = self.config.get_string(OWNER_NAMESPACE_KEY, "spinnaker");
        let pod = format!("pod {}", owner.name);
        match self.oort.get_manifest(&account, &namespace, &pod, false).await {
            Ok(_) => {
                info!(stage_id = %stage.id, owner = %owner.name, "Task owner is alive");
                return;
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => {
                warn!(stage_id = %stage.id, owner = %owner.name, error = %err, "Failed to look up task owner pod");
                return;
            }
        }

        warn!(
            stage_id = %stage.id,
            kato_task_id = task_id,
            owner = %owner.name,
            "Task owner is gone, restarting task"
        );
        let restarted = match kato.update_task_retryability(provider, task_id, true).await {
            Ok(_) => kato
                .restart_task(provider, task_id, &[Self::operation(stage)])
                .await
                .map(|_| ()),
            Err(err) => Err(err),
        };

        match restarted {
            Ok(()) => {
                result.context.insert(FORCED_RETRIES.into(), json!(forced + 1));
                result.context.insert(RETRIED_OPERATION.into(), Value::Bool(true));
                result.context.insert(LAST_FORCED_RETRY.into(), json!(now_millis()));
            }
            Err(err) => {
                error!(stage_id = %stage.id, kato_task_id = task_id, error = %err, "Forced retry failed");
                result.context.insert(FORCE_RETRY_FATAL_ERROR.into(), Value::Bool(true));
            }
        }
    }
}

#[async_trait]
impl Task for MonitorDeployManifestTask {
    fn name(&self) -> &'static str {
        Self::TASK_NAME
    }

    async fn execute(&self, stage: &StageExecution) -> Result<TaskResult, TaskError> {
        let Poll { mut result, task } = self.monitor.poll(stage).await?;
        let Some(task) = task else {
            return Ok(result);
        };
        let still_running = !task.status.completed && !task.status.failed;
        if result.status == ExecutionStatus::Running
            && still_running
            && self.config.is_enabled(RETRY_TASK_FLAG, false)
        {
            self.force_retry(stage, &task.id, &mut result).await;
        }
        Ok(result)
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        Some(POLICY)
    }
}

fn last_task_id(stage: &StageExecution) -> Option<&str> {
    stage
        .context
        .get(LAST_TASK_ID)
        .and_then(|id| id.get("id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

/// `kato.tasks` with the entry for `task` replaced.
fn record_task(stage: &StageExecution, task: &KatoTask) -> Result<Value, TaskError> {
    let mut tasks: Vec<Value> = stage
        .context
        .get(KATO_TASKS)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    tasks.retain(|entry| entry.get("id").and_then(Value::as_str) != Some(task.id.as_str()));
    tasks.push(serde_json::to_value(task)?);
    Ok(Value::Array(tasks))
}
