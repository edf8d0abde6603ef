//! Stage definitions for manifest pipelines.

mod deploy;
mod operations;

pub use deploy::DeployManifestStage;
pub use operations::{DeleteManifestStage, DisableManifestStage, PatchManifestStage};

use std::sync::Arc;

use pipeline::StageDefinitionRegistry;

use crate::services::ManifestServices;

/// Registry holding every manifest stage, wired to `services`.
pub fn registry(services: &ManifestServices) -> StageDefinitionRegistry {
    let mut registry = StageDefinitionRegistry::new();
    registry.register(Arc::new(DeployManifestStage::new(services.clone())));
    registry.register(Arc::new(PatchManifestStage::new(services.clone())));
    registry.register(Arc::new(DeleteManifestStage::new(services.clone())));
    registry.register(Arc::new(DisableManifestStage::new(services.clone())));
    registry
}
