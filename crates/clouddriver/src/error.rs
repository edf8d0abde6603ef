//! Error types for the Clouddriver and Front50 clients.

use pipeline::TaskError;
use thiserror::Error;

/// Errors from downstream service calls.
#[derive(Debug, Error)]
pub enum ClouddriverError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// API returned an error status
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An artifact could not be decoded
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    /// Base URL cannot carry path segments
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClouddriverError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Api { status, .. } => *status == 404,
            _ => false,
        }
    }

    /// Transport failures, throttling and server errors may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(err) => !err.is_decode() && !err.is_builder(),
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<ClouddriverError> for TaskError {
    fn from(err: ClouddriverError) -> Self {
        match err {
            ClouddriverError::InvalidArtifact(message) => TaskError::Artifact(message),
            ClouddriverError::Config(message) => TaskError::Config(message),
            other => TaskError::Remote {
                retryable: other.is_retryable(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let server_error = ClouddriverError::Api {
            status: 503,
            message: "unavailable".into(),
        };
        let bad_request = ClouddriverError::Api {
            status: 400,
            message: "bad".into(),
        };

        assert!(server_error.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(!ClouddriverError::NotFound("gone".into()).is_retryable());
        assert!(ClouddriverError::NotFound("gone".into()).is_not_found());
    }

    #[test]
    fn test_conversion_into_task_error() {
        let err: TaskError = ClouddriverError::Api {
            status: 502,
            message: "bad gateway".into(),
        }
        .into();
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "API error: 502 - bad gateway");

        let err: TaskError = ClouddriverError::InvalidArtifact("not base64".into()).into();
        assert!(matches!(err, TaskError::Artifact(_)));
    }
}
