//! Execution status shared by pipelines, stages and tasks.

use serde::{Deserialize, Serialize};

/// Status of a pipeline, stage or task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Not yet started.
    #[default]
    NotStarted,
    /// In progress; tasks in this state are re-invoked after their backoff.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Failed, but the pipeline is allowed to carry on.
    FailedContinue,
    /// Failed and halts the pipeline.
    Terminal,
    /// Canceled by a user or by an upstream failure.
    Canceled,
    /// Skipped without running.
    Skipped,
    /// Stopped early, but not as a failure.
    Stopped,
}

impl ExecutionStatus {
    /// Whether the status is final.
    pub fn is_complete(self) -> bool {
        !matches!(self, Self::NotStarted | Self::Running)
    }

    /// Whether the status halts downstream work.
    pub fn is_halt(self) -> bool {
        matches!(self, Self::Terminal | Self::Canceled | Self::Stopped)
    }

    /// Whether downstream work may proceed after this status.
    pub fn is_successful(self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped | Self::FailedContinue)
    }

    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::FailedContinue => "FAILED_CONTINUE",
            Self::Terminal => "TERMINAL",
            Self::Canceled => "CANCELED",
            Self::Skipped => "SKIPPED",
            Self::Stopped => "STOPPED",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
