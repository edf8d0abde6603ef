//! Task results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ExecutionStatus;

/// Outcome of a single task invocation.
///
/// `context` is merged into the stage context and `outputs` into the stage
/// outputs. Both are shallow merges: keys are overwritten, never removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: ExecutionStatus,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub outputs: Map<String, Value>,
}

impl TaskResult {
    /// A result with the given status and no data.
    #[must_use]
    pub fn of(status: ExecutionStatus) -> Self {
        Self {
            status,
            context: Map::new(),
            outputs: Map::new(),
        }
    }

    #[must_use]
    pub fn running() -> Self {
        Self::of(ExecutionStatus::Running)
    }

    #[must_use]
    pub fn succeeded() -> Self {
        Self::of(ExecutionStatus::Succeeded)
    }

    #[must_use]
    pub fn builder(status: ExecutionStatus) -> TaskResultBuilder {
        TaskResultBuilder {
            result: Self::of(status),
        }
    }
}

/// Builder for [`TaskResult`].
#[derive(Debug)]
pub struct TaskResultBuilder {
    result: TaskResult,
}

impl TaskResultBuilder {
    /// Replace the whole context delta.
    #[must_use]
    pub fn context(mut self, context: Map<String, Value>) -> Self {
        self.result.context = context;
        self
    }

    /// Add a single context entry.
    #[must_use]
    pub fn context_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.result.context.insert(key.into(), value.into());
        self
    }

    /// Replace the whole outputs delta.
    #[must_use]
    pub fn outputs(mut self, outputs: Map<String, Value>) -> Self {
        self.result.outputs = outputs;
        self
    }

    /// Add a single outputs entry.
    #[must_use]
    pub fn output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.result.outputs.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn build(self) -> TaskResult {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_collects_context_and_outputs() {
        let result = TaskResult::builder(ExecutionStatus::Succeeded)
            .context_entry("kato.result.expected", true)
            .output("manifests", json!([]))
            .build();

        assert_eq!(result.status, ExecutionStatus::Succeeded);
        assert_eq!(result.context["kato.result.expected"], json!(true));
        assert_eq!(result.outputs["manifests"], json!([]));
    }

    #[test]
    fn test_running_has_no_data() {
        let result = TaskResult::running();
        assert_eq!(result.status, ExecutionStatus::Running);
        assert!(result.context.is_empty());
        assert!(result.outputs.is_empty());
    }
}
