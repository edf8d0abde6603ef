//! Pipeline triggers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::artifacts::{Artifact, ExpectedArtifact};

/// What started the pipeline, together with the artifacts and parameters it
/// carried.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    #[serde(rename = "type", default)]
    pub trigger_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub resolved_expected_artifacts: Vec<ExpectedArtifact>,
    /// Trigger-specific fields (build info, tags, payloads, ...).
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Trigger {
    /// A manual trigger started by `user`.
    #[must_use]
    pub fn manual(user: impl Into<String>) -> Self {
        Self {
            trigger_type: "manual".to_string(),
            user: Some(user.into()),
            ..Self::default()
        }
    }
}
