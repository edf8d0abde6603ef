//! Artifact content retrieval.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use pipeline::{Artifact, RetrySupport};
use tracing::debug;

use crate::error::ClouddriverError;
use crate::services::OortService;

/// Artifact type whose content travels inline as base64.
pub const EMBEDDED_BASE64: &str = "embedded/base64";

const FETCH_ATTEMPTS: u32 = 10;
const FETCH_BACKOFF: Duration = Duration::from_millis(200);

/// Fetches artifact content, decoding embedded artifacts locally.
#[derive(Clone)]
pub struct ArtifactFetcher {
    oort: Arc<dyn OortService>,
    retry: RetrySupport,
}

impl ArtifactFetcher {
    pub fn new(oort: Arc<dyn OortService>) -> Self {
        Self {
            oort,
            retry: RetrySupport::new(),
        }
    }

    /// Raw content of `artifact`.
    pub async fn fetch(&self, artifact: &Artifact) -> Result<Vec<u8>, ClouddriverError> {
        if artifact.artifact_type.as_deref() == Some(EMBEDDED_BASE64) {
            let encoded = artifact.reference.as_deref().unwrap_or_default();
            debug!(name = ?artifact.name, "Decoding embedded artifact");
            return STANDARD
                .decode(encoded.trim())
                .map_err(|e| ClouddriverError::InvalidArtifact(format!("invalid base64: {e}")));
        }

        self.retry
            .retry(
                || self.oort.fetch_artifact(artifact),
                FETCH_ATTEMPTS,
                FETCH_BACKOFF,
                true,
            )
            .await
    }

    /// Content of `artifact` as UTF-8 text.
    pub async fn fetch_text(&self, artifact: &Artifact) -> Result<String, ClouddriverError> {
        let bytes = self.fetch(artifact).await?;
        String::from_utf8(bytes)
            .map_err(|e| ClouddriverError::InvalidArtifact(format!("content is not UTF-8: {e}")))
    }
}
