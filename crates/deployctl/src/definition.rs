//! Pipeline and stage definition files.

use std::path::Path;

use pipeline::{ExecutionInfo, PipelineExecution, StageExecution, Trigger};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::{read_yaml, LoadError};

/// One stage of a pipeline definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDefinition {
    pub ref_id: String,
    #[serde(rename = "type")]
    pub stage_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub requisite_stage_ref_ids: Vec<String>,
    #[serde(default)]
    pub context: Map<String, Value>,
}

/// A pipeline as written in `pipeline.yaml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDefinition {
    pub application: String,
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
}

impl PipelineDefinition {
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        read_yaml(path)
    }

    /// A fresh execution of this pipeline.
    pub fn into_execution(self) -> PipelineExecution {
        let mut execution = PipelineExecution::new(self.application, self.trigger);
        for definition in self.stages {
            let mut stage = StageExecution::new(definition.stage_type, definition.context)
                .with_ref_id(definition.ref_id);
            if let Some(name) = definition.name {
                stage = stage.with_name(name);
            }
            stage.requisite_stage_ref_ids = definition.requisite_stage_ref_ids;
            execution.add_stage(stage);
        }
        execution
    }
}

/// A single deploy context to resolve offline.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolveRequest {
    pub application: String,
    pub trigger: Trigger,
    pub context: Map<String, Value>,
}

impl ResolveRequest {
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        read_yaml(path)
    }

    /// A standalone `deployManifest` stage carrying the request.
    pub fn into_stage(self) -> StageExecution {
        StageExecution::new("deployManifest", self.context).with_execution(ExecutionInfo {
            application: self.application,
            trigger: self.trigger,
            ..ExecutionInfo::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PIPELINE: &str = r#"
application: web
trigger:
  type: manual
  user: ops
stages:
  - refId: deploy
    type: deployManifest
    name: Deploy web
    context:
      account: k8s
      manifests:
        - kind: Deployment
          metadata: {name: web}
  - refId: "2"
    type: patchManifest
    requisiteStageRefIds: [deploy]
    context:
      manifestName: deployment web
"#;

    #[test]
    fn test_pipeline_definition_into_execution() {
        let definition: PipelineDefinition = serde_yaml::from_str(PIPELINE).unwrap();
        let execution = definition.into_execution();

        assert_eq!(execution.application, "web");
        assert_eq!(execution.trigger.user.as_deref(), Some("ops"));
        assert_eq!(execution.stages.len(), 2);

        let deploy = &execution.stages[0];
        assert_eq!(deploy.ref_id, "deploy");
        assert_eq!(deploy.name, "Deploy web");
        assert_eq!(deploy.context["account"], json!("k8s"));
        assert_eq!(deploy.execution.application, "web");

        let patch = &execution.stages[1];
        assert_eq!(patch.name, "patchManifest");
        assert_eq!(patch.requisite_stage_ref_ids, vec!["deploy"]);
        assert_eq!(execution.topological_stages().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_stage_type_is_required() {
        let result: Result<PipelineDefinition, _> =
            serde_yaml::from_str("application: web\nstages:\n  - refId: '1'\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_request_into_stage() {
        let request: ResolveRequest = serde_yaml::from_str(
            "application: web\ncontext:\n  manifests: [{kind: ConfigMap}]\n",
        )
        .unwrap();
        let stage = request.into_stage();
        assert_eq!(stage.stage_type, "deployManifest");
        assert_eq!(stage.application(), "web");
        assert_eq!(stage.context["manifests"], json!([{"kind": "ConfigMap"}]));
    }
}
