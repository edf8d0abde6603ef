//! Resolves the manifests a stage deploys or patches.

use clouddriver::ArtifactFetcher;
use pipeline::artifacts::{get_artifacts, get_bound_artifact_for_id, get_bound_artifact_for_stage};
use pipeline::{
    Artifact, ExpressionContext, ExpressionError, ExpressionEvaluator, StageExecution,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::context::{ManifestContext, Source};
use crate::error::ManifestError;

/// Manifests and artifacts ready to be sent to Clouddriver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluatedManifests {
    pub manifests: Vec<Value>,
    pub required_artifacts: Vec<Artifact>,
    pub optional_artifacts: Vec<Artifact>,
}

/// Binds, fetches and expression-evaluates manifests.
#[derive(Clone)]
pub struct ManifestEvaluator {
    fetcher: ArtifactFetcher,
    expressions: ExpressionEvaluator,
}

impl ManifestEvaluator {
    pub fn new(fetcher: ArtifactFetcher) -> Self {
        Self {
            fetcher,
            expressions: ExpressionEvaluator::new(),
        }
    }

    pub async fn evaluate(
        &self,
        stage: &StageExecution,
        context: &dyn ManifestContext,
    ) -> Result<EvaluatedManifests, ManifestError> {
        let manifests = match context.source() {
            Source::Artifact => self.fetch_manifests(stage, context).await?,
            Source::Text => context.manifests().to_vec(),
        };

        let manifests = if context.is_skip_expression_evaluation() {
            manifests
        } else {
            self.evaluate_expressions(stage, manifests)?
        };

        Ok(EvaluatedManifests {
            manifests,
            required_artifacts: required_artifacts(stage, context)?,
            optional_artifacts: get_artifacts(stage),
        })
    }

    async fn fetch_manifests(
        &self,
        stage: &StageExecution,
        context: &dyn ManifestContext,
    ) -> Result<Vec<Value>, ManifestError> {
        let id = context.manifest_artifact_id();
        let mut artifact = get_bound_artifact_for_stage(stage, id, context.manifest_artifact())
            .ok_or_else(|| match id {
                Some(id) => ManifestError::UnboundArtifact(id.to_string()),
                None => ManifestError::NoManifestArtifact,
            })?;

        if !artifact.has_account() {
            if let Some(account) = context.manifest_artifact_account() {
                artifact.artifact_account = Some(account.to_string());
            }
        }

        info!(
            stage_id = %stage.id,
            artifact_type = ?artifact.artifact_type,
            artifact_name = ?artifact.name,
            "Fetching manifest artifact"
        );
        let text = self.fetcher.fetch_text(&artifact).await?;
        parse_manifests(&text)
    }

    fn evaluate_expressions(
        &self,
        stage: &StageExecution,
        manifests: Vec<Value>,
    ) -> Result<Vec<Value>, ManifestError> {
        let ctx = ExpressionContext::for_stage(stage);
        let (evaluated, summary) = self
            .expressions
            .evaluate(&Value::Array(manifests), &ctx)
            .map_err(|ExpressionError::Failed(summary)| ManifestError::Expression(summary))?;
        debug!(stage_id = %stage.id, expressions = summary.total, "Evaluated manifest expressions");

        match evaluated {
            Value::Array(manifests) => Ok(manifests),
            other => Ok(vec![other]),
        }
    }
}

fn required_artifacts(
    stage: &StageExecution,
    context: &dyn ManifestContext,
) -> Result<Vec<Artifact>, ManifestError> {
    let mut artifacts = Vec::new();
    for id in context.required_artifact_ids() {
        let artifact = get_bound_artifact_for_id(stage, id)
            .ok_or_else(|| ManifestError::UnboundArtifact(id.clone()))?;
        if !artifacts.contains(&artifact) {
            artifacts.push(artifact);
        }
    }
    for binding in context.required_artifacts() {
        let id = binding.expected_artifact_id.as_deref();
        let artifact = get_bound_artifact_for_stage(stage, id, binding.artifact.as_ref())
            .ok_or_else(|| ManifestError::UnboundArtifact(id.unwrap_or_default().to_string()))?;
        if !artifacts.contains(&artifact) {
            artifacts.push(artifact);
        }
    }
    Ok(artifacts)
}

/// Split a multi-document YAML stream into manifest objects.
///
/// Empty documents are skipped and documents holding a list contribute
/// each of their entries.
pub fn parse_manifests(text: &str) -> Result<Vec<Value>, ManifestError> {
    let mut manifests = Vec::new();
    if text.trim().is_empty() {
        return Ok(manifests);
    }
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(document)
            .map_err(|e| ManifestError::InvalidManifest(e.to_string()))?;
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    push_manifest(&mut manifests, item)?;
                }
            }
            other => push_manifest(&mut manifests, other)?,
        }
    }
    Ok(manifests)
}

fn push_manifest(manifests: &mut Vec<Value>, value: Value) -> Result<(), ManifestError> {
    match value {
        Value::Null => Ok(()),
        Value::Object(_) => {
            manifests.push(value);
            Ok(())
        }
        other => Err(ManifestError::InvalidManifest(format!(
            "expected a mapping, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_multi_document_yaml() {
        let text = "\
apiVersion: v1
kind: Service
metadata:
  name: web
---
---
- kind: ConfigMap
  metadata:
    name: a
- kind: ConfigMap
  metadata:
    name: b
";
        let manifests = parse_manifests(text).unwrap();
        assert_eq!(manifests.len(), 3);
        assert_eq!(manifests[0]["kind"], json!("Service"));
        assert_eq!(manifests[2]["metadata"]["name"], json!("b"));
    }

    #[test]
    fn test_parse_empty_text() {
        assert!(parse_manifests("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_scalars() {
        let err = parse_manifests("just a string").unwrap_err();
        assert!(matches!(err, ManifestError::InvalidManifest(_)));
    }
}
