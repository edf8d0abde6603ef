//! Pipeline execution core.
//!
//! Stages carry a mutable JSON context and are made of tasks. A task reads
//! the stage and returns a [`TaskResult`]; the [`StageRunner`] merges the
//! result back and re-invokes tasks that are still `RUNNING` after their
//! backoff, until they settle or time out.
//!
//! # Architecture
//!
//! - [`execution`]: pipelines, stages, tasks, statuses and results
//! - [`task`]: the [`Task`] trait and retry policies
//! - [`runner`]: stage definitions and the stage/pipeline runners
//! - [`expression`]: `${ … }` substitution over JSON
//! - [`artifacts`]: artifacts and expected-artifact binding
//! - [`config`]: dynamic configuration (flags and tunables)
//! - [`retry`]: retry helper for flaky downstream calls

pub mod artifacts;
pub mod config;
pub mod error;
pub mod execution;
pub mod expression;
pub mod retry;
pub mod runner;
pub mod task;

pub use artifacts::{Artifact, ExpectedArtifact};
pub use config::{ConfigError, DynamicConfig, PropertyConfig};
pub use error::{GraphError, TaskError};
pub use execution::{
    ExecutionInfo, ExecutionStatus, PipelineExecution, StageExecution, StageSnapshot,
    SyntheticStageOwner, TaskExecution, TaskResult, Trigger,
};
pub use expression::{ExpressionContext, ExpressionError, ExpressionEvaluator};
pub use retry::RetrySupport;
pub use runner::{
    PipelineRunner, StageDefinitionBuilder, StageDefinitionRegistry, StageOutcome, StageRunner,
};
pub use task::{RetryPolicy, Task, TaskNode};
