//! Service traits for Kato, Oort and Front50.

use async_trait::async_trait;
use pipeline::Artifact;
use serde_json::Value;

use crate::error::ClouddriverError;
use crate::models::{Application, KatoTask, Manifest, ManifestCoordinates, TaskId, TaskOwner};

/// Submits cloud operations and tracks the resulting tasks.
#[async_trait]
pub trait KatoService: Send + Sync {
    /// Submit a batch of operations, e.g. `[{"deployManifest": {...}}]`.
    async fn request_operations(
        &self,
        cloud_provider: &str,
        operations: &[Value],
    ) -> Result<TaskId, ClouddriverError>;

    async fn lookup_task(&self, id: &str) -> Result<KatoTask, ClouddriverError>;

    /// The Clouddriver instance currently running the task.
    async fn lookup_task_owner(
        &self,
        cloud_provider: &str,
        id: &str,
    ) -> Result<TaskOwner, ClouddriverError>;

    async fn update_task_retryability(
        &self,
        cloud_provider: &str,
        id: &str,
        retryable: bool,
    ) -> Result<KatoTask, ClouddriverError>;

    /// Restart a task by replaying `operations` on another instance.
    async fn restart_task(
        &self,
        cloud_provider: &str,
        id: &str,
        operations: &[Value],
    ) -> Result<KatoTask, ClouddriverError>;

    /// Resume a failed, retryable task.
    async fn resume_task(&self, id: &str) -> Result<TaskId, ClouddriverError>;
}

/// Read-side queries against live manifests and artifacts.
#[async_trait]
pub trait OortService: Send + Sync {
    /// Fetch a manifest by `<kind> <name>`.
    async fn get_manifest(
        &self,
        account: &str,
        location: &str,
        name: &str,
        include_events: bool,
    ) -> Result<Manifest, ClouddriverError>;

    /// Every manifest of `kind` in a cluster.
    async fn get_cluster_manifests(
        &self,
        account: &str,
        location: &str,
        kind: &str,
        app: &str,
        cluster: &str,
    ) -> Result<Vec<ManifestCoordinates>, ClouddriverError>;

    /// Raw artifact content.
    async fn fetch_artifact(&self, artifact: &Artifact) -> Result<Vec<u8>, ClouddriverError>;
}

/// Application metadata lookups.
#[async_trait]
pub trait Front50Service: Send + Sync {
    /// `None` when the application does not exist.
    async fn get_application(&self, name: &str) -> Result<Option<Application>, ClouddriverError>;
}
