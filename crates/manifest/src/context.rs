//! Typed views over manifest stage contexts.
//!
//! The raw `serde_json::Map` on the stage stays the source of truth; these
//! structs are deserialized from it on demand and tolerate missing keys.

use pipeline::Artifact;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Provider assumed when a context does not name one.
pub const DEFAULT_CLOUD_PROVIDER: &str = "kubernetes";

fn default_cloud_provider() -> String {
    DEFAULT_CLOUD_PROVIDER.to_string()
}

/// Where a stage's manifests come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Text,
    Artifact,
}

/// An artifact to bind, either by expected-artifact id or inline.
///
/// A bare artifact on the wire is read as an inline binding, which is how
/// already-resolved `requiredArtifacts` come back from the context.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindArtifact {
    pub expected_artifact_id: Option<String>,
    pub artifact: Option<Artifact>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Binding {
    #[serde(default)]
    expected_artifact_id: Option<String>,
    #[serde(default)]
    artifact: Option<Artifact>,
}

impl<'de> Deserialize<'de> for BindArtifact {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.get("expectedArtifactId").is_some() || value.get("artifact").is_some() {
            let binding: Binding = serde_json::from_value(value).map_err(de::Error::custom)?;
            Ok(Self {
                expected_artifact_id: binding.expected_artifact_id,
                artifact: binding.artifact,
            })
        } else {
            let artifact: Artifact = serde_json::from_value(value).map_err(de::Error::custom)?;
            Ok(Self {
                expected_artifact_id: None,
                artifact: Some(artifact),
            })
        }
    }
}

/// Manifest source fields shared by the deploy and patch contexts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSource {
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub manifest_artifact_id: Option<String>,
    #[serde(default)]
    pub manifest_artifact: Option<Artifact>,
    #[serde(default)]
    pub manifest_artifact_account: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub required_artifact_ids: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub required_artifacts: Vec<BindArtifact>,
    #[serde(default)]
    pub skip_expression_evaluation: bool,
}

/// Read-only view shared by contexts whose manifests go through
/// [`ManifestEvaluator`](crate::ManifestEvaluator).
pub trait ManifestContext: Send + Sync {
    fn manifest_source(&self) -> &ManifestSource;

    /// Inline manifests, or patch bodies for a patch.
    fn manifests(&self) -> &[Value];

    fn source(&self) -> Source {
        self.manifest_source().source
    }

    fn manifest_artifact_id(&self) -> Option<&str> {
        self.manifest_source()
            .manifest_artifact_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    fn manifest_artifact(&self) -> Option<&Artifact> {
        self.manifest_source().manifest_artifact.as_ref()
    }

    fn manifest_artifact_account(&self) -> Option<&str> {
        self.manifest_source()
            .manifest_artifact_account
            .as_deref()
            .filter(|account| !account.is_empty())
    }

    fn required_artifact_ids(&self) -> &[String] {
        &self.manifest_source().required_artifact_ids
    }

    fn required_artifacts(&self) -> &[BindArtifact] {
        &self.manifest_source().required_artifacts
    }

    fn is_skip_expression_evaluation(&self) -> bool {
        self.manifest_source().skip_expression_evaluation
    }
}

/// How old versions of a cluster are handled after a deploy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ManifestStrategy {
    RedBlack,
    BlueGreen,
    Highlander,
    #[default]
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficManagementOptions {
    #[serde(default)]
    pub enable_traffic: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub services: Vec<String>,
    #[serde(default)]
    pub strategy: ManifestStrategy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficManagement {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub options: TrafficManagementOptions,
}

impl TrafficManagement {
    /// The strategy to apply, if traffic management is on.
    pub fn active_strategy(&self) -> Option<ManifestStrategy> {
        (self.enabled && self.options.strategy != ManifestStrategy::None)
            .then_some(self.options.strategy)
    }
}

/// Context of a `deployManifest` stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployManifestContext {
    #[serde(flatten)]
    pub manifest_source: ManifestSource,
    #[serde(default, deserialize_with = "null_as_default")]
    pub manifests: Vec<Value>,
    #[serde(default)]
    pub traffic_management: TrafficManagement,
    #[serde(default)]
    pub namespace_override: Option<String>,
    #[serde(default, alias = "accountName", alias = "credentials")]
    pub account: Option<String>,
    #[serde(default = "default_cloud_provider")]
    pub cloud_provider: String,
    #[serde(default)]
    pub moniker: Option<clouddriver::Moniker>,
}

impl ManifestContext for DeployManifestContext {
    fn manifest_source(&self) -> &ManifestSource {
        &self.manifest_source
    }

    fn manifests(&self) -> &[Value] {
        &self.manifests
    }
}

/// Patch strategy understood by Clouddriver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    #[default]
    Strategic,
    Json,
    Merge,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchOptions {
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    #[serde(default)]
    pub record: bool,
}

/// The live manifest a patch, delete or disable operation targets.
///
/// Static mode names the manifest directly; dynamic mode resolves it from
/// a cluster and a criteria such as `newest`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestTarget {
    #[serde(default)]
    pub manifest_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub criteria: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default, alias = "accountName", alias = "credentials")]
    pub account: Option<String>,
    #[serde(default = "default_cloud_provider")]
    pub cloud_provider: String,
}

impl ManifestTarget {
    pub fn is_dynamic(&self) -> bool {
        self.mode.as_deref() == Some("dynamic")
    }

    /// Check that the target can be resolved by Clouddriver.
    pub fn validate(&self) -> Result<(), String> {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        if self.is_dynamic() {
            if !present(&self.cluster) || !present(&self.criteria) {
                return Err("A dynamic manifest target requires a cluster and a criteria".into());
            }
        } else if !present(&self.manifest_name) {
            return Err("A manifest name is required".into());
        }
        Ok(())
    }
}

/// Context of a `patchManifest` stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchManifestContext {
    #[serde(flatten)]
    pub manifest_source: ManifestSource,
    #[serde(flatten)]
    pub target: ManifestTarget,
    /// A single patch object or a list of them on the wire.
    #[serde(default, deserialize_with = "one_or_many")]
    pub patch_body: Vec<Value>,
    #[serde(default)]
    pub options: PatchOptions,
    #[serde(default)]
    pub allow_null_source: bool,
}

impl ManifestContext for PatchManifestContext {
    fn manifest_source(&self) -> &ManifestSource {
        &self.manifest_source
    }

    fn manifests(&self) -> &[Value] {
        &self.patch_body
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOptions {
    #[serde(default)]
    pub cascading: Option<bool>,
    #[serde(default)]
    pub grace_period_seconds: Option<u64>,
}

/// Context of a `deleteManifest` stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteManifestContext {
    #[serde(flatten)]
    pub target: ManifestTarget,
    #[serde(default, deserialize_with = "null_as_default")]
    pub kinds: Vec<String>,
    #[serde(default)]
    pub label_selectors: Option<Value>,
    #[serde(default)]
    pub options: DeleteOptions,
}

impl DeleteManifestContext {
    /// A delete may select by label across kinds instead of naming a manifest.
    pub fn validate(&self) -> Result<(), String> {
        if self.label_selectors.is_some() && !self.kinds.is_empty() {
            return Ok(());
        }
        self.target.validate()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        single => vec![single],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deploy_context_defaults() {
        let context: DeployManifestContext = serde_json::from_value(json!({})).unwrap();
        assert_eq!(context.source(), Source::Text);
        assert_eq!(context.cloud_provider, "kubernetes");
        assert!(context.manifests().is_empty());
        assert_eq!(context.traffic_management.active_strategy(), None);
    }

    #[test]
    fn test_deploy_context_from_stage_json() {
        let context: DeployManifestContext = serde_json::from_value(json!({
            "source": "artifact",
            "manifestArtifactId": "abc",
            "manifestArtifactAccount": "github",
            "requiredArtifactIds": ["x"],
            "requiredArtifacts": [{"expectedArtifactId": "y"}],
            "skipExpressionEvaluation": true,
            "manifests": null,
            "account": "k8s",
            "trafficManagement": {
                "enabled": true,
                "options": {"strategy": "RED_BLACK", "services": ["service my-svc"]}
            }
        }))
        .unwrap();

        assert_eq!(context.source(), Source::Artifact);
        assert_eq!(context.manifest_artifact_id(), Some("abc"));
        assert_eq!(context.manifest_artifact_account(), Some("github"));
        assert_eq!(context.required_artifact_ids(), ["x".to_string()]);
        assert_eq!(
            context.required_artifacts()[0].expected_artifact_id.as_deref(),
            Some("y")
        );
        assert!(context.is_skip_expression_evaluation());
        assert_eq!(context.account.as_deref(), Some("k8s"));
        assert_eq!(
            context.traffic_management.active_strategy(),
            Some(ManifestStrategy::RedBlack)
        );
    }

    #[test]
    fn test_bare_artifact_is_inline_binding() {
        let binding: BindArtifact = serde_json::from_value(json!({
            "type": "docker/image",
            "name": "gcr.io/app",
            "reference": "gcr.io/app:1.0"
        }))
        .unwrap();
        assert_eq!(binding.expected_artifact_id, None);
        assert_eq!(
            binding.artifact.and_then(|a| a.reference).as_deref(),
            Some("gcr.io/app:1.0")
        );
    }

    #[test]
    fn test_strategy_none_is_inactive() {
        let management: TrafficManagement =
            serde_json::from_value(json!({"enabled": true, "options": {"strategy": "NONE"}}))
                .unwrap();
        assert_eq!(management.active_strategy(), None);
    }

    #[test]
    fn test_patch_body_accepts_object_or_list() {
        let single: PatchManifestContext =
            serde_json::from_value(json!({"patchBody": {"spec": {"replicas": 2}}})).unwrap();
        assert_eq!(single.patch_body.len(), 1);
        assert_eq!(single.options.merge_strategy, MergeStrategy::Strategic);

        let many: PatchManifestContext = serde_json::from_value(json!({
            "patchBody": [{"op": "add"}, {"op": "remove"}],
            "options": {"mergeStrategy": "json"},
            "manifestName": "deployment web",
            "location": "prod"
        }))
        .unwrap();
        assert_eq!(many.manifests().len(), 2);
        assert_eq!(many.options.merge_strategy, MergeStrategy::Json);
        assert_eq!(many.target.manifest_name.as_deref(), Some("deployment web"));
    }

    #[test]
    fn test_target_validation() {
        let mut target = ManifestTarget::default();
        assert!(target.validate().is_err());

        target.manifest_name = Some("replicaSet web-v001".into());
        assert!(target.validate().is_ok());

        target.mode = Some("dynamic".into());
        target.cluster = Some("replicaSet web".into());
        assert!(target.validate().is_err());
        target.criteria = Some("newest".into());
        assert!(target.validate().is_ok());
    }

    #[test]
    fn test_delete_by_label_selector() {
        let context: DeleteManifestContext = serde_json::from_value(json!({
            "kinds": ["deployment"],
            "labelSelectors": {"selectors": [{"kind": "EQUALS", "key": "app", "values": ["web"]}]},
            "options": {"cascading": true, "gracePeriodSeconds": 30}
        }))
        .unwrap();
        assert!(context.validate().is_ok());
        assert_eq!(context.options.grace_period_seconds, Some(30));
    }
}
