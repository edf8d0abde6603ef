use std::sync::Arc;

use async_trait::async_trait;
use clouddriver::{Manifest, ManifestCoordinates};
use pipeline::{
    StageDefinitionBuilder, StageExecution, SyntheticStageOwner, TaskError, TaskNode,
};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{DeleteManifestStage, DisableManifestStage};
use crate::context::{DeployManifestContext, ManifestStrategy, DEFAULT_CLOUD_PROVIDER};
use crate::services::ManifestServices;
use crate::tasks::{
    CheckIfApplicationExistsForManifestTask, DeployManifestTask, MonitorDeployManifestTask,
    PromoteManifestKatoOutputsTask, ResolveDeploySourceManifestTask, WaitForManifestStableTask,
};

const CLUSTER_ANNOTATION: &str = "moniker.spinnaker.io/cluster";
const APPLICATION_ANNOTATION: &str = "moniker.spinnaker.io/application";
const CHECK_APPLICATION_FLAG: &str = "stages.deploy-manifest-stage.check-if-application-exists";

const DISABLE: &[&str] = &[DisableManifestStage::STAGE_TYPE];
const DELETE: &[&str] = &[DeleteManifestStage::STAGE_TYPE];
const DISABLE_THEN_DELETE: &[&str] = &[
    DisableManifestStage::STAGE_TYPE,
    DeleteManifestStage::STAGE_TYPE,
];
const NOTHING: &[&str] = &[];

/// Deploys manifests and, with traffic management, retires older versions
/// of the same cluster.
pub struct DeployManifestStage {
    services: ManifestServices,
}

impl DeployManifestStage {
    pub const STAGE_TYPE: &'static str = "deployManifest";

    pub fn new(services: ManifestServices) -> Self {
        Self { services }
    }

    /// Other manifests in the cluster of a freshly deployed `manifest`.
    async fn cluster_siblings(
        &self,
        stage: &StageExecution,
        context: &DeployManifestContext,
        account: &str,
        manifest: &Value,
    ) -> Result<Vec<ManifestCoordinates>, TaskError> {
        let annotations = manifest.pointer("/metadata/annotations");
        let Some(cluster) = annotations
            .and_then(|a| a.get(CLUSTER_ANNOTATION))
            .and_then(Value::as_str)
        else {
            return Ok(Vec::new());
        };

        let application = application_for(stage, context, manifest);
        let namespace = manifest
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let name = manifest
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let kind = lower_camel(
            manifest
                .get("kind")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        );

        let siblings = self
            .services
            .oort
            .get_cluster_manifests(account, namespace, &kind, application, cluster)
            .await?;
        debug!(
            stage_id = %stage.id,
            cluster,
            siblings = siblings.len(),
            "Found cluster manifests"
        );
        Ok(siblings
            .into_iter()
            .filter(|sibling| sibling.name != name)
            .map(|mut sibling| {
                if sibling.namespace.is_empty() {
                    sibling.namespace = namespace.to_string();
                }
                sibling
            })
            .collect())
    }

    /// A never-healthy old manifest is deleted instead of disabled.
    async fn should_delete(&self, account: &str, old: &ManifestCoordinates) -> Result<bool, TaskError> {
        let manifest: Manifest = self
            .services
            .oort
            .get_manifest(account, &old.namespace, &old.full_resource_name(), false)
            .await?;
        Ok(!manifest.status.stable.state
            && !manifest.status.failed.state
            && manifest.available_replicas().unwrap_or(0) == 0)
    }
}

#[async_trait]
impl StageDefinitionBuilder for DeployManifestStage {
    fn stage_type(&self) -> &'static str {
        Self::STAGE_TYPE
    }

    fn task_graph(&self, _stage: &StageExecution) -> Vec<TaskNode> {
        let services = &self.services;
        let mut graph = Vec::new();
        if services.config.is_enabled(CHECK_APPLICATION_FLAG, false) {
            graph.push(TaskNode::of(Arc::new(
                CheckIfApplicationExistsForManifestTask::new(
                    Arc::clone(&services.front50),
                    Arc::clone(&services.config),
                ),
            )));
        }
        graph.extend([
            TaskNode::of(Arc::new(ResolveDeploySourceManifestTask::new(
                services.evaluator(),
            ))),
            TaskNode::of(Arc::new(DeployManifestTask::new(
                Arc::clone(&services.kato),
                services.evaluator(),
            ))),
            TaskNode::of(Arc::new(MonitorDeployManifestTask::new(
                Arc::clone(&services.kato),
                Arc::clone(&services.oort),
                Arc::clone(&services.config),
            ))),
            TaskNode::of(Arc::new(PromoteManifestKatoOutputsTask::new())),
            TaskNode::of(Arc::new(WaitForManifestStableTask::new(Arc::clone(
                &services.oort,
            )))),
        ]);
        graph
    }

    async fn after_stages(&self, stage: &StageExecution) -> Result<Vec<StageExecution>, TaskError> {
        let context: DeployManifestContext = stage.context_as()?;
        let Some(strategy) = context.traffic_management.active_strategy() else {
            return Ok(Vec::new());
        };
        let account = context.account.clone().unwrap_or_default();
        let deployed = stage
            .context
            .get("outputs.manifests")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut stages = Vec::new();
        for manifest in &deployed {
            for old in self.cluster_siblings(stage, &context, &account, manifest).await? {
                let application = application_for(stage, &context, manifest);
                let old_context = old_manifest_context(&account, application, &old);

                let stage_types = match strategy {
                    ManifestStrategy::RedBlack => DISABLE,
                    ManifestStrategy::Highlander => DISABLE_THEN_DELETE,
                    ManifestStrategy::BlueGreen => {
                        if self.should_delete(&account, &old).await? {
                            DELETE
                        } else {
                            DISABLE
                        }
                    }
                    ManifestStrategy::None => NOTHING,
                };

                for stage_type in stage_types {
                    info!(
                        stage_id = %stage.id,
                        strategy = ?strategy,
                        manifest = %old.full_resource_name(),
                        after_stage = *stage_type,
                        "Planning traffic management stage"
                    );
                    let name = format!("{stage_type} {}", old.full_resource_name());
                    stages.push(StageExecution::synthetic(
                        stage,
                        *stage_type,
                        name,
                        old_context.clone(),
                        SyntheticStageOwner::StageAfter,
                    ));
                }
            }
        }
        Ok(stages)
    }
}

/// Application owning `manifest`: its moniker annotation, then the stage
/// moniker, then the pipeline's application.
fn application_for<'a>(
    stage: &'a StageExecution,
    context: &'a DeployManifestContext,
    manifest: &'a Value,
) -> &'a str {
    manifest
        .pointer("/metadata/annotations")
        .and_then(|a| a.get(APPLICATION_ANNOTATION))
        .and_then(Value::as_str)
        .or_else(|| context.moniker.as_ref().and_then(|m| m.app.as_deref()))
        .unwrap_or_else(|| stage.application())
}

fn old_manifest_context(
    account: &str,
    application: &str,
    old: &ManifestCoordinates,
) -> Map<String, Value> {
    let context = json!({
        "account": account,
        "app": application,
        "location": old.namespace,
        "manifestName": old.full_resource_name(),
        "cloudProvider": DEFAULT_CLOUD_PROVIDER,
    });
    match context {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// `ReplicaSet` -> `replicaSet`.
fn lower_camel(kind: &str) -> String {
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
