//! Artifacts and expected-artifact binding.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::execution::{StageExecution, StageSnapshot};

/// Context/output key holding resolved expected artifacts.
pub const RESOLVED_EXPECTED_ARTIFACTS: &str = "resolvedExpectedArtifacts";

/// A reference to a deployable or consumable resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub custom_kind: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Artifact {
    /// An `embedded/base64` artifact carrying `content` inline.
    #[must_use]
    pub fn embedded_base64(name: impl Into<String>, encoded: impl Into<String>) -> Self {
        Self {
            artifact_type: Some("embedded/base64".to_string()),
            name: Some(name.into()),
            reference: Some(encoded.into()),
            ..Self::default()
        }
    }

    /// Whether an account still needs to be filled in.
    pub fn has_account(&self) -> bool {
        self.artifact_account
            .as_deref()
            .is_some_and(|account| !account.is_empty())
    }
}

/// An artifact a pipeline expects, and what it was bound to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedArtifact {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_artifact: Option<Artifact>,
    #[serde(default)]
    pub use_prior_artifact: bool,
    #[serde(default)]
    pub use_default_artifact: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_artifact: Option<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_artifact: Option<Artifact>,
}

impl ExpectedArtifact {
    /// The bound artifact, falling back to the default when allowed.
    pub fn resolved(&self) -> Option<&Artifact> {
        self.bound_artifact.as_ref().or_else(|| {
            self.use_default_artifact
                .then_some(self.default_artifact.as_ref())
                .flatten()
        })
    }
}

/// Resolve an artifact for `stage`: an inline artifact wins, otherwise the
/// expected artifact `id` is looked up.
pub fn get_bound_artifact_for_stage(
    stage: &StageExecution,
    id: Option<&str>,
    inline: Option<&Artifact>,
) -> Option<Artifact> {
    if let Some(artifact) = inline {
        return Some(artifact.clone());
    }
    id.and_then(|id| get_bound_artifact_for_id(stage, id))
}

/// Bound artifact for expected artifact `id`, searching the trigger first and
/// then ancestor stages, nearest first.
pub fn get_bound_artifact_for_id(stage: &StageExecution, id: &str) -> Option<Artifact> {
    let from_trigger = stage
        .trigger()
        .resolved_expected_artifacts
        .iter()
        .find(|expected| expected.id == id)
        .and_then(ExpectedArtifact::resolved);
    if let Some(artifact) = from_trigger {
        return Some(artifact.clone());
    }

    for ancestor in stage.ancestors() {
        if let Some(artifact) = expected_artifacts_of(ancestor)
            .into_iter()
            .find(|expected| expected.id == id)
            .and_then(|expected| expected.resolved().cloned())
        {
            debug!(
                expected_artifact_id = %id,
                stage_id = %ancestor.id,
                "Bound artifact from upstream stage"
            );
            return Some(artifact);
        }
    }
    None
}

/// Every artifact available to `stage`: trigger artifacts followed by
/// upstream `artifacts` outputs, without duplicates.
pub fn get_artifacts(stage: &StageExecution) -> Vec<Artifact> {
    let mut artifacts: Vec<Artifact> = Vec::new();
    let upstream = stage
        .ancestor_outputs("artifacts")
        .into_iter()
        .filter_map(|value| serde_json::from_value::<Vec<Artifact>>(value.clone()).ok())
        .flatten();

    for artifact in stage.trigger().artifacts.iter().cloned().chain(upstream) {
        if !artifacts.contains(&artifact) {
            artifacts.push(artifact);
        }
    }
    artifacts
}

fn expected_artifacts_of(stage: &StageSnapshot) -> Vec<ExpectedArtifact> {
    [
        stage.outputs.get(RESOLVED_EXPECTED_ARTIFACTS),
        stage.context.get(RESOLVED_EXPECTED_ARTIFACTS),
    ]
    .into_iter()
    .flatten()
    .filter_map(|value| serde_json::from_value::<Vec<ExpectedArtifact>>(value.clone()).ok())
    .flatten()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn artifact(name: &str) -> Artifact {
        Artifact {
            artifact_type: Some("github/file".into()),
            name: Some(name.into()),
            reference: Some(format!("https://example.com/{name}")),
            ..Artifact::default()
        }
    }

    fn expected(id: &str, bound: Option<Artifact>) -> ExpectedArtifact {
        ExpectedArtifact {
            id: id.into(),
            bound_artifact: bound,
            ..ExpectedArtifact::default()
        }
    }

    fn stage() -> StageExecution {
        StageExecution::new("deployManifest", Map::new())
    }

    #[test]
    fn test_inline_artifact_wins() {
        let mut stage = stage();
        stage.execution.trigger.resolved_expected_artifacts =
            vec![expected("id", Some(artifact("bound")))];
        let inline = artifact("inline");

        let resolved = get_bound_artifact_for_stage(&stage, Some("id"), Some(&inline));
        assert_eq!(resolved, Some(inline));
    }

    #[test]
    fn test_binds_from_trigger() {
        let mut stage = stage();
        stage.execution.trigger.resolved_expected_artifacts =
            vec![expected("manifest", Some(artifact("deploy.yml")))];

        let resolved = get_bound_artifact_for_stage(&stage, Some("manifest"), None).unwrap();
        assert_eq!(resolved.name.as_deref(), Some("deploy.yml"));
        assert!(get_bound_artifact_for_id(&stage, "other").is_none());
    }

    #[test]
    fn test_binds_from_ancestor_outputs_and_default() {
        let mut stage = stage();
        let default = ExpectedArtifact {
            id: "fallback".into(),
            use_default_artifact: true,
            default_artifact: Some(artifact("default.yml")),
            ..ExpectedArtifact::default()
        };
        stage.execution.ancestors = vec![StageSnapshot {
            id: "upstream".into(),
            outputs: serde_json::from_value(json!({
                "resolvedExpectedArtifacts": [expected("baked", Some(artifact("baked.yml"))), default]
            }))
            .unwrap(),
            ..StageSnapshot::default()
        }];

        assert_eq!(
            get_bound_artifact_for_id(&stage, "baked").and_then(|a| a.name),
            Some("baked.yml".to_string())
        );
        assert_eq!(
            get_bound_artifact_for_id(&stage, "fallback").and_then(|a| a.name),
            Some("default.yml".to_string())
        );
    }

    #[test]
    fn test_get_artifacts_deduplicates() {
        let mut stage = stage();
        stage.execution.trigger.artifacts = vec![artifact("a")];
        stage.execution.ancestors = vec![StageSnapshot {
            id: "upstream".into(),
            outputs: serde_json::from_value(json!({
                "artifacts": [artifact("a"), artifact("b")]
            }))
            .unwrap(),
            ..StageSnapshot::default()
        }];

        let names: Vec<String> = get_artifacts(&stage)
            .into_iter()
            .filter_map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_artifact_wire_format() {
        let parsed: Artifact = serde_json::from_value(json!({
            "type": "embedded/base64",
            "reference": "a2luZDogUG9k",
            "artifactAccount": "embedded-artifact",
            "unknownField": 1
        }))
        .unwrap();
        assert_eq!(parsed.artifact_type.as_deref(), Some("embedded/base64"));
        assert!(parsed.has_account());

        let json = serde_json::to_value(Artifact::embedded_base64("m", "eA==")).unwrap();
        assert_eq!(
            json,
            json!({"type": "embedded/base64", "name": "m", "reference": "eA=="})
        );
    }
}
