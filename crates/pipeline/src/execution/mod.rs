//! Execution model: pipelines, stages, tasks and their results.

mod pipeline;
mod result;
mod stage;
mod status;
mod trigger;

pub use pipeline::PipelineExecution;
pub use result::{TaskResult, TaskResultBuilder};
pub use stage::{
    ExecutionInfo, StageExecution, StageSnapshot, SyntheticStageOwner, TaskExecution,
};
pub use status::ExecutionStatus;
pub use trigger::Trigger;

/// Current time in epoch millis.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Context key holding failure details for a stage.
pub const EXCEPTION: &str = "exception";

/// Failure details in the shape stored under [`EXCEPTION`].
#[must_use]
pub fn exception_details(error: &str, errors: &[String]) -> serde_json::Value {
    serde_json::json!({
        "details": {
            "error": error,
            "errors": errors,
        },
        "timestamp": now_millis(),
    })
}
