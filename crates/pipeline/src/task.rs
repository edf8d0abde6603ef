//! The task abstraction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TaskError;
use crate::execution::{StageExecution, TaskResult};

/// Backoff and timeout for tasks that poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between invocations while the task returns `RUNNING`.
    pub backoff_period: Duration,
    /// Overall time the task may keep running.
    pub timeout: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(backoff_period: Duration, timeout: Duration) -> Self {
        Self {
            backoff_period,
            timeout,
        }
    }
}

/// A unit of work inside a stage.
///
/// Tasks never mutate the stage directly: they return a [`TaskResult`] whose
/// context and outputs are merged by the runner.
#[async_trait]
pub trait Task: Send + Sync {
    /// Stable task name recorded on the stage.
    fn name(&self) -> &'static str;

    /// Run the task once.
    async fn execute(&self, stage: &StageExecution) -> Result<TaskResult, TaskError>;

    /// Polling tasks return a policy; others must not return `RUNNING`.
    fn retry_policy(&self) -> Option<RetryPolicy> {
        None
    }

    /// Timeout that depends on the stage or on dynamic config.
    fn dynamic_timeout(&self, _stage: &StageExecution) -> Option<Duration> {
        None
    }
}

/// A task in a stage's task graph.
#[derive(Clone)]
pub struct TaskNode {
    pub name: String,
    pub task: Arc<dyn Task>,
}

impl TaskNode {
    /// Node named after the task itself.
    pub fn of(task: Arc<dyn Task>) -> Self {
        Self {
            name: task.name().to_string(),
            task,
        }
    }
}

impl std::fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNode").field("name", &self.name).finish()
    }
}
