//! Error types for manifest evaluation and submission.

use clouddriver::ClouddriverError;
use pipeline::expression::EvaluationSummary;
use pipeline::TaskError;
use thiserror::Error;

/// Errors raised while preparing or submitting manifest operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Neither `manifestArtifactId` nor `manifestArtifact` was given.
    #[error("No manifest artifact was specified.")]
    NoManifestArtifact,

    #[error("No artifact could be bound to '{0}'")]
    UnboundArtifact(String),

    /// Artifact content is not a manifest document.
    #[error("Failed to read manifest artifact: {0}")]
    InvalidManifest(String),

    #[error("Failure evaluating manifest expressions: {0}")]
    Expression(EvaluationSummary),

    /// The stage context cannot produce a valid operation.
    #[error("{0}")]
    Validation(String),

    #[error("Invalid stage context: {0}")]
    Context(#[from] serde_json::Error),

    #[error(transparent)]
    Clouddriver(#[from] ClouddriverError),
}

impl From<ManifestError> for TaskError {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::NoManifestArtifact
            | ManifestError::UnboundArtifact(_)
            | ManifestError::InvalidManifest(_) => TaskError::Artifact(err.to_string()),
            ManifestError::Expression(_) => TaskError::Expression(err.to_string()),
            ManifestError::Validation(message) => TaskError::Validation(message),
            ManifestError::Context(_) => TaskError::Validation(err.to_string()),
            ManifestError::Clouddriver(inner) => inner.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_keeps_messages() {
        let err: TaskError = ManifestError::UnboundArtifact("abc".into()).into();
        assert!(matches!(err, TaskError::Artifact(_)));
        assert_eq!(err.to_string(), "No artifact could be bound to 'abc'");

        let err: TaskError = ManifestError::Validation("bad".into()).into();
        assert!(matches!(err, TaskError::Validation(ref m) if m == "bad"));
    }

    #[test]
    fn test_transient_remote_errors_stay_retryable() {
        let err: TaskError = ManifestError::Clouddriver(ClouddriverError::Api {
            status: 503,
            message: "unavailable".into(),
        })
        .into();
        assert!(err.is_retryable());

        let err: TaskError = ManifestError::NoManifestArtifact.into();
        assert!(!err.is_retryable());
    }
}
