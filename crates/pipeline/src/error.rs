//! Error types for pipeline execution.

use thiserror::Error;

/// Errors raised by a task invocation.
///
/// Retryable errors are treated like a `RUNNING` result when the task has a
/// retry policy; everything else ends the stage as `TERMINAL`.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The stage context is invalid for this task.
    #[error("{0}")]
    Validation(String),

    /// Expression evaluation failed.
    #[error("{0}")]
    Expression(String),

    /// An artifact could not be bound or fetched.
    #[error("{0}")]
    Artifact(String),

    /// A downstream service call failed.
    #[error("{message}")]
    Remote { message: String, retryable: bool },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl TaskError {
    /// Whether a retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote { retryable: true, .. })
    }

    /// A retryable downstream failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: true,
        }
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("Invalid stage context: {err}"))
    }
}

/// Errors in the stage dependency graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Stage '{stage}' requires unknown stage '{requisite}'")]
    UnknownRequisite { stage: String, requisite: String },

    #[error("Stage graph contains a cycle involving stage '{0}'")]
    Cycle(String),

    #[error("No stage definition registered for type '{0}'")]
    UnknownStageType(String),
}
