//! `${ … }` expression substitution over JSON values.
//!
//! Strings that are exactly one expression are replaced by the typed result;
//! strings mixing text and expressions are interpolated. The expression
//! language is SpEL-flavoured: property paths, indexing, comparisons,
//! arithmetic, `&&`/`||`/`!` and helper calls written `#name(...)`.
//!
//! ```
//! use pipeline::expression::{ExpressionContext, ExpressionEvaluator};
//! use serde_json::json;
//!
//! let ctx = ExpressionContext::from_root(json!({"replicas": 3, "tag": "v2"}));
//! let (value, _) = ExpressionEvaluator::new()
//!     .evaluate(&json!({"replicas": "${ replicas }", "image": "nginx:${ tag }"}), &ctx)
//!     .unwrap();
//! assert_eq!(value, json!({"replicas": 3, "image": "nginx:v2"}));
//! ```

mod dialect;
mod functions;

use std::fmt;
use std::sync::Arc;

use minijinja::{Environment, UndefinedBehavior};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::execution::{StageExecution, StageSnapshot};
use dialect::{split_template, to_jinja, Segment};

/// A single expression that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionFailure {
    pub expression: String,
    pub description: String,
}

/// Outcome of evaluating every expression in a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationSummary {
    pub total: usize,
    pub failures: Vec<ExpressionFailure>,
}

impl EvaluationSummary {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    fn record_failure(&mut self, expression: &str, description: String) {
        self.failures.push(ExpressionFailure {
            expression: expression.to_string(),
            description,
        });
    }
}

impl fmt::Display for EvaluationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, failure) in self.failures.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(
                f,
                "Failed to evaluate [{}] {}",
                failure.expression, failure.description
            )?;
        }
        Ok(())
    }
}

/// Expression evaluation errors.
#[derive(Debug, Clone, Error)]
pub enum ExpressionError {
    /// One or more expressions failed; the summary lists them all.
    #[error("{0}")]
    Failed(EvaluationSummary),
}

/// Variables and stage lookups visible to expressions.
#[derive(Debug, Clone)]
pub struct ExpressionContext {
    root: Value,
    current: Arc<Value>,
    stages: Arc<Vec<Value>>,
}

impl ExpressionContext {
    /// Context with only the given root variables.
    #[must_use]
    pub fn from_root(root: Value) -> Self {
        Self {
            root,
            current: Arc::new(Value::Null),
            stages: Arc::new(Vec::new()),
        }
    }

    /// Context for evaluating inside `stage`.
    ///
    /// Top-level names resolve against the stage context first and then the
    /// outputs of ancestor stages, nearest ancestor winning. `execution`,
    /// `trigger`, `parameters` and `application` are always present.
    #[must_use]
    pub fn for_stage(stage: &StageExecution) -> Self {
        let mut root = Map::new();
        for ancestor in stage.ancestors().iter().rev() {
            for (key, value) in &ancestor.outputs {
                root.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in &stage.context {
            root.insert(key.clone(), value.clone());
        }

        let trigger = serde_json::to_value(stage.trigger()).unwrap_or(Value::Null);
        root.insert(
            "execution".into(),
            serde_json::json!({
                "id": stage.execution.id,
                "application": stage.execution.application,
                "trigger": trigger,
            }),
        );
        root.insert(
            "parameters".into(),
            Value::Object(stage.trigger().parameters.clone()),
        );
        root.insert("trigger".into(), trigger);
        root.insert(
            "application".into(),
            Value::String(stage.execution.application.clone()),
        );

        let current = serde_json::to_value(StageSnapshot::from(stage)).unwrap_or(Value::Null);
        let stages = stage
            .ancestors()
            .iter()
            .filter_map(|ancestor| serde_json::to_value(ancestor).ok())
            .collect();

        Self {
            root: Value::Object(root),
            current: Arc::new(current),
            stages: Arc::new(stages),
        }
    }
}

/// Evaluates `${ … }` expressions embedded in JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionEvaluator;

impl ExpressionEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Replace every expression in `value`.
    ///
    /// Failed expressions are left as written and reported through
    /// [`ExpressionError::Failed`].
    pub fn evaluate(
        &self,
        value: &Value,
        ctx: &ExpressionContext,
    ) -> Result<(Value, EvaluationSummary), ExpressionError> {
        let root = minijinja::Value::from_serialize(&ctx.root);
        let mut summary = EvaluationSummary::default();
        let evaluated = self.walk(value, ctx, &root, &mut summary);

        if summary.has_failures() {
            debug!(
                failures = summary.failures.len(),
                total = summary.total,
                "Expression evaluation failed"
            );
            return Err(ExpressionError::Failed(summary));
        }
        Ok((evaluated, summary))
    }

    fn walk(
        &self,
        value: &Value,
        ctx: &ExpressionContext,
        root: &minijinja::Value,
        summary: &mut EvaluationSummary,
    ) -> Value {
        match value {
            Value::String(text) => self.evaluate_string(text, ctx, root, summary),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.walk(item, ctx, root, summary))
                    .collect(),
            ),
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, item) in map {
                    let key = match self.evaluate_string(key, ctx, root, summary) {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    out.insert(key, self.walk(item, ctx, root, summary));
                }
                Value::Object(out)
            }
            other => other.clone(),
        }
    }

    fn evaluate_string(
        &self,
        text: &str,
        ctx: &ExpressionContext,
        root: &minijinja::Value,
        summary: &mut EvaluationSummary,
    ) -> Value {
        if !text.contains("${") {
            return Value::String(text.to_string());
        }

        let segments = split_template(text);
        if let [Segment::Expression(expression)] = segments.as_slice() {
            summary.total += 1;
            return match Self::evaluate_expression(expression, ctx, root) {
                Ok(value) => value,
                Err(description) => {
                    summary.record_failure(expression.trim(), description);
                    Value::String(text.to_string())
                }
            };
        }

        let mut out = String::with_capacity(text.len());
        let mut failed = false;
        for segment in segments {
            match segment {
                Segment::Literal(literal) => out.push_str(literal),
                Segment::Expression(expression) => {
                    summary.total += 1;
                    match Self::evaluate_expression(expression, ctx, root) {
                        Ok(Value::String(s)) => out.push_str(&s),
                        Ok(Value::Null) => {}
                        Ok(other) => out.push_str(&other.to_string()),
                        Err(description) => {
                            summary.record_failure(expression.trim(), description);
                            failed = true;
                        }
                    }
                }
            }
        }

        if failed {
            Value::String(text.to_string())
        } else {
            Value::String(out)
        }
    }

    fn evaluate_expression(
        expression: &str,
        ctx: &ExpressionContext,
        root: &minijinja::Value,
    ) -> Result<Value, String> {
        let translated = to_jinja(expression);
        if translated.is_empty() {
            return Err("empty expression".to_string());
        }

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        functions::register_builtins(&mut env);
        functions::register_stage_functions(
            &mut env,
            Arc::clone(&ctx.current),
            Arc::clone(&ctx.stages),
        );

        let compiled = env
            .compile_expression(&translated)
            .map_err(|e| e.to_string())?;
        let result = compiled.eval(root).map_err(|e| e.to_string())?;
        if result.is_undefined() {
            return Err("refers to an undefined value".to_string());
        }
        serde_json::to_value(&result).map_err(|e| e.to_string())
    }
}
