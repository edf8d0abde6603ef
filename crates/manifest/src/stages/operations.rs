use std::sync::Arc;

use pipeline::{StageDefinitionBuilder, StageExecution, TaskNode};

use crate::services::ManifestServices;
use crate::tasks::{
    ManifestOperationTask, MonitorKatoTask, PatchManifestTask, PromoteManifestKatoOutputsTask,
    ResolvePatchSourceManifestTask, UpdateManifestWaitForStableTask,
};

fn monitor(services: &ManifestServices) -> TaskNode {
    TaskNode::of(Arc::new(MonitorKatoTask::new(
        Arc::clone(&services.kato),
        Arc::clone(&services.config),
    )))
}

fn promote() -> TaskNode {
    TaskNode::of(Arc::new(PromoteManifestKatoOutputsTask::new()))
}

fn wait_for_stable(services: &ManifestServices) -> TaskNode {
    TaskNode::of(Arc::new(UpdateManifestWaitForStableTask::new(
        Arc::clone(&services.oort),
        Arc::clone(&services.config),
    )))
}

/// Patches a live manifest in place.
pub struct PatchManifestStage {
    services: ManifestServices,
}

impl PatchManifestStage {
    pub const STAGE_TYPE: &'static str = "patchManifest";

    pub fn new(services: ManifestServices) -> Self {
        Self { services }
    }
}

impl StageDefinitionBuilder for PatchManifestStage {
    fn stage_type(&self) -> &'static str {
        Self::STAGE_TYPE
    }

    fn task_graph(&self, _stage: &StageExecution) -> Vec<TaskNode> {
        let services = &self.services;
        vec![
            TaskNode::of(Arc::new(ResolvePatchSourceManifestTask::new(
                services.evaluator(),
            ))),
            TaskNode::of(Arc::new(PatchManifestTask::new(
                Arc::clone(&services.kato),
                services.evaluator(),
            ))),
            monitor(services),
            promote(),
            wait_for_stable(services),
        ]
    }
}

/// Deletes manifests by name or by label selector.
pub struct DeleteManifestStage {
    services: ManifestServices,
}

impl DeleteManifestStage {
    pub const STAGE_TYPE: &'static str = "deleteManifest";

    pub fn new(services: ManifestServices) -> Self {
        Self { services }
    }
}

impl StageDefinitionBuilder for DeleteManifestStage {
    fn stage_type(&self) -> &'static str {
        Self::STAGE_TYPE
    }

    fn task_graph(&self, _stage: &StageExecution) -> Vec<TaskNode> {
        vec![
            TaskNode::of(Arc::new(ManifestOperationTask::delete(Arc::clone(
                &self.services.kato,
            )))),
            monitor(&self.services),
            promote(),
        ]
    }
}

/// Takes a manifest out of service without deleting it.
pub struct DisableManifestStage {
    services: ManifestServices,
}

impl DisableManifestStage {
    pub const STAGE_TYPE: &'static str = "disableManifest";

    pub fn new(services: ManifestServices) -> Self {
        Self { services }
    }
}

impl StageDefinitionBuilder for DisableManifestStage {
    fn stage_type(&self) -> &'static str {
        Self::STAGE_TYPE
    }

    fn task_graph(&self, _stage: &StageExecution) -> Vec<TaskNode> {
        vec![
            TaskNode::of(Arc::new(ManifestOperationTask::disable(Arc::clone(
                &self.services.kato,
            )))),
            monitor(&self.services),
            promote(),
            wait_for_stable(&self.services),
        ]
    }
}
