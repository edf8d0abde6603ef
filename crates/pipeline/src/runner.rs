//! Drives stages and pipelines: builds task graphs, re-invokes polling tasks
//! until they settle, and runs synthetic after-stages.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{error, info, warn};

use crate::error::{GraphError, TaskError};
use crate::execution::{
    exception_details, now_millis, ExecutionStatus, PipelineExecution, StageExecution,
    TaskExecution, EXCEPTION,
};
use crate::task::TaskNode;

/// Describes how a stage type runs.
#[async_trait]
pub trait StageDefinitionBuilder: Send + Sync {
    /// The `type` of stages this builder handles.
    fn stage_type(&self) -> &'static str;

    /// Ordered tasks for `stage`.
    fn task_graph(&self, stage: &StageExecution) -> Vec<TaskNode>;

    /// Synthetic stages to run after `stage` succeeds.
    async fn after_stages(&self, _stage: &StageExecution) -> Result<Vec<StageExecution>, TaskError> {
        Ok(Vec::new())
    }
}

/// Stage builders keyed by stage type.
#[derive(Clone, Default)]
pub struct StageDefinitionRegistry {
    builders: HashMap<String, Arc<dyn StageDefinitionBuilder>>,
}

impl StageDefinitionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, builder: Arc<dyn StageDefinitionBuilder>) {
        self.builders
            .insert(builder.stage_type().to_string(), builder);
    }

    pub fn get(&self, stage_type: &str) -> Option<Arc<dyn StageDefinitionBuilder>> {
        self.builders.get(stage_type).cloned()
    }

    /// Registered stage types, sorted.
    pub fn stage_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

/// Result of running one stage.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub status: ExecutionStatus,
    /// After-stages that ran, including nested ones.
    pub synthetic_stages: Vec<StageExecution>,
}

/// Runs a single stage to completion.
#[derive(Clone)]
pub struct StageRunner {
    registry: StageDefinitionRegistry,
}

impl StageRunner {
    #[must_use]
    pub fn new(registry: StageDefinitionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &StageDefinitionRegistry {
        &self.registry
    }

    /// Run every task of `stage`, then its after-stages.
    pub fn run<'a>(
        &'a self,
        stage: &'a mut StageExecution,
    ) -> BoxFuture<'a, Result<StageOutcome, GraphError>> {
        async move {
            let builder = self
                .registry
                .get(&stage.stage_type)
                .ok_or_else(|| GraphError::UnknownStageType(stage.stage_type.clone()))?;

            let graph = builder.task_graph(stage);
            stage.status = ExecutionStatus::Running;
            stage.start_time = Some(now_millis());
            stage.tasks = graph
                .iter()
                .enumerate()
                .map(|(index, node)| {
                    let mut task =
                        TaskExecution::new((index + 1).to_string(), &node.name, node.task.name());
                    task.stage_start = index == 0;
                    task.stage_end = index + 1 == graph.len();
                    task
                })
                .collect();

            info!(
                stage_id = %stage.id,
                stage_type = %stage.stage_type,
                tasks = graph.len(),
                "Stage started"
            );

            let mut status = ExecutionStatus::Succeeded;
            for (index, node) in graph.iter().enumerate() {
                match Self::run_task(stage, index, node).await {
                    ExecutionStatus::Succeeded | ExecutionStatus::Skipped => {}
                    other => {
                        status = other;
                        break;
                    }
                }
            }

            let mut synthetic_stages = Vec::new();
            if status == ExecutionStatus::Succeeded {
                match builder.after_stages(stage).await {
                    Ok(children) => {
                        for mut child in children {
                            let outcome = self.run(&mut child).await?;
                            synthetic_stages.push(child);
                            synthetic_stages.extend(outcome.synthetic_stages);
                            if !outcome.status.is_successful() {
                                warn!(
                                    stage_id = %stage.id,
                                    after_stage_status = %outcome.status,
                                    "After-stage failed"
                                );
                                status = ExecutionStatus::Terminal;
                                break;
                            }
                        }
                    }
                    Err(err) => {
                        error!(stage_id = %stage.id, error = %err, "Failed to plan after-stages");
                        record_exception(stage, &err.to_string());
                        status = ExecutionStatus::Terminal;
                    }
                }
            }

            stage.status = status;
            stage.end_time = Some(now_millis());
            info!(
                stage_id = %stage.id,
                stage_type = %stage.stage_type,
                status = %status,
                "Stage completed"
            );

            Ok(StageOutcome {
                status,
                synthetic_stages,
            })
        }
        .boxed()
    }

    async fn run_task(stage: &mut StageExecution, index: usize, node: &TaskNode) -> ExecutionStatus {
        let policy = node.task.retry_policy();
        let timeout = node
            .task
            .dynamic_timeout(stage)
            .or(policy.map(|policy| policy.timeout));
        let started = tokio::time::Instant::now();

        stage.tasks[index].status = ExecutionStatus::Running;
        stage.tasks[index].start_time = Some(now_millis());
        info!(stage_id = %stage.id, task = %node.name, "Task started");

        let status = loop {
            let status = match node.task.execute(stage).await {
                Ok(result) => {
                    stage.merge_result(&result);
                    result.status
                }
                Err(err) if err.is_retryable() && policy.is_some() => {
                    warn!(
                        stage_id = %stage.id,
                        task = %node.name,
                        error = %err,
                        "Task failed with a retryable error"
                    );
                    ExecutionStatus::Running
                }
                Err(err) => {
                    error!(stage_id = %stage.id, task = %node.name, error = %err, "Task failed");
                    record_exception(stage, &err.to_string());
                    break ExecutionStatus::Terminal;
                }
            };

            if status != ExecutionStatus::Running {
                break status;
            }

            let Some(policy) = policy else {
                let message = format!("Task {} returned RUNNING without a retry policy", node.name);
                error!(stage_id = %stage.id, task = %node.name, "{message}");
                record_exception(stage, &message);
                break ExecutionStatus::Terminal;
            };

            if let Some(timeout) = timeout {
                if started.elapsed() >= timeout {
                    let message = format!(
                        "Task {} timed out after {}s",
                        node.name,
                        timeout.as_secs()
                    );
                    warn!(stage_id = %stage.id, task = %node.name, "{message}");
                    record_exception(stage, &message);
                    break ExecutionStatus::Terminal;
                }
            }

            tokio::time::sleep(policy.backoff_period).await;
        };

        stage.tasks[index].status = status;
        stage.tasks[index].end_time = Some(now_millis());
        info!(stage_id = %stage.id, task = %node.name, status = %status, "Task completed");
        status
    }
}

/// Record `message` as the stage failure, keeping details a task already wrote.
fn record_exception(stage: &mut StageExecution, message: &str) {
    if stage.context.contains_key(EXCEPTION) {
        return;
    }
    stage.context.insert(
        EXCEPTION.to_string(),
        exception_details(message, &[message.to_string()]),
    );
}

/// Runs every stage of a pipeline in dependency order.
#[derive(Clone)]
pub struct PipelineRunner {
    stage_runner: StageRunner,
}

impl PipelineRunner {
    #[must_use]
    pub fn new(registry: StageDefinitionRegistry) -> Self {
        Self {
            stage_runner: StageRunner::new(registry),
        }
    }

    /// Run the pipeline, stopping at the first stage that halts.
    pub async fn run(&self, pipeline: &mut PipelineExecution) -> Result<ExecutionStatus, GraphError> {
        let order = pipeline.topological_stages()?;
        for index in &order {
            let stage_type = &pipeline.stages[*index].stage_type;
            if self.stage_runner.registry().get(stage_type).is_none() {
                return Err(GraphError::UnknownStageType(stage_type.clone()));
            }
        }

        pipeline.status = ExecutionStatus::Running;
        pipeline.start_time = Some(now_millis());
        info!(
            execution_id = %pipeline.id,
            application = %pipeline.application,
            stages = order.len(),
            "Pipeline started"
        );

        let mut status = ExecutionStatus::Succeeded;
        let mut synthetic = Vec::new();
        for index in order {
            let mut execution = pipeline.execution_info();
            execution.ancestors = pipeline.ancestor_snapshots(index);

            let stage = &mut pipeline.stages[index];
            stage.execution = execution;
            let outcome = self.stage_runner.run(stage).await?;
            synthetic.extend(outcome.synthetic_stages);

            if outcome.status.is_halt() {
                status = outcome.status;
                break;
            }
        }

        pipeline.stages.extend(synthetic);
        pipeline.status = status;
        pipeline.end_time = Some(now_millis());
        info!(execution_id = %pipeline.id, status = %status, "Pipeline completed");
        Ok(status)
    }
}
