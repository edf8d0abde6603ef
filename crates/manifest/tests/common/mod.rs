//! Hand-written service fakes shared by the manifest integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clouddriver::{
    Application, ClouddriverError, Condition, Front50Service, KatoService, KatoTask, Manifest,
    ManifestCoordinates, ManifestStatus, OortService, TaskId, TaskOwner,
};
use manifest::ManifestServices;
use pipeline::{Artifact, PropertyConfig, StageExecution};
use serde_json::{Map, Value};

pub const APPLICATION: &str = "my-app";

pub fn context(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

/// A stage of `stage_type` inside an execution of [`APPLICATION`].
pub fn stage(stage_type: &str, value: Value) -> StageExecution {
    let mut stage = StageExecution::new(stage_type, context(value));
    stage.execution.id = "exec-1".into();
    stage.execution.application = APPLICATION.into();
    stage
}

fn unavailable() -> ClouddriverError {
    ClouddriverError::Api {
        status: 500,
        message: "internal error".into(),
    }
}

/// Kato fake: serves a configurable task and records every call.
#[derive(Default)]
pub struct FakeKato {
    /// Returned by `lookup_task`; `None` answers 404.
    pub task: Mutex<Option<KatoTask>>,
    /// Returned by `lookup_task_owner`; `None` answers 500.
    pub owner: Option<TaskOwner>,
    pub fail_retryability: bool,
    pub fail_restart: bool,
    pub calls: Mutex<Vec<String>>,
    pub submitted: Mutex<Vec<(String, Vec<Value>)>>,
    pub restarted: Mutex<Vec<Vec<Value>>>,
}

impl FakeKato {
    pub fn with_task(task: KatoTask) -> Self {
        Self {
            task: Mutex::new(Some(task)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> Vec<(String, Vec<Value>)> {
        self.submitted.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl KatoService for FakeKato {
    async fn request_operations(
        &self,
        cloud_provider: &str,
        operations: &[Value],
    ) -> Result<TaskId, ClouddriverError> {
        self.record(format!("requestOperations {cloud_provider}"));
        self.submitted
            .lock()
            .unwrap()
            .push((cloud_provider.to_string(), operations.to_vec()));
        Ok(TaskId::new("42"))
    }

    async fn lookup_task(&self, id: &str) -> Result<KatoTask, ClouddriverError> {
        self.record(format!("lookupTask {id}"));
        self.task
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ClouddriverError::NotFound(format!("task {id}")))
    }

    async fn lookup_task_owner(
        &self,
        cloud_provider: &str,
        id: &str,
    ) -> Result<TaskOwner, ClouddriverError> {
        self.record(format!("lookupTaskOwner {cloud_provider} {id}"));
        self.owner.clone().ok_or_else(unavailable)
    }

    async fn update_task_retryability(
        &self,
        cloud_provider: &str,
        id: &str,
        retryable: bool,
    ) -> Result<KatoTask, ClouddriverError> {
        self.record(format!("updateTaskRetryability {cloud_provider} {id} {retryable}"));
        if self.fail_retryability {
            return Err(unavailable());
        }
        Ok(KatoTask {
            id: id.to_string(),
            ..KatoTask::default()
        })
    }

    async fn restart_task(
        &self,
        cloud_provider: &str,
        id: &str,
        operations: &[Value],
    ) -> Result<KatoTask, ClouddriverError> {
        self.record(format!("restartTask {cloud_provider} {id}"));
        self.restarted.lock().unwrap().push(operations.to_vec());
        if self.fail_restart {
            return Err(unavailable());
        }
        Ok(KatoTask {
            id: id.to_string(),
            ..KatoTask::default()
        })
    }

    async fn resume_task(&self, id: &str) -> Result<TaskId, ClouddriverError> {
        self.record(format!("resumeTask {id}"));
        Ok(TaskId::new(id))
    }
}

/// Oort fake: manifests by name, one cluster listing and artifact content.
#[derive(Default)]
pub struct FakeOort {
    pub manifests: Mutex<HashMap<String, Manifest>>,
    /// Returned by `get_cluster_manifests` for any cluster.
    pub cluster: Vec<ManifestCoordinates>,
    /// When set, `get_manifest` answers with this status.
    pub manifest_error: Option<u16>,
    /// Artifact content keyed by artifact reference.
    pub artifacts: HashMap<String, String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeOort {
    pub fn put_manifest(&self, name: &str, manifest: Manifest) {
        self.manifests
            .lock()
            .unwrap()
            .insert(name.to_string(), manifest);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl OortService for FakeOort {
    async fn get_manifest(
        &self,
        account: &str,
        location: &str,
        name: &str,
        _include_events: bool,
    ) -> Result<Manifest, ClouddriverError> {
        self.record(format!("getManifest {account} {location} {name}"));
        if let Some(status) = self.manifest_error {
            return Err(ClouddriverError::Api {
                status,
                message: "lookup failed".into(),
            });
        }
        self.manifests
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ClouddriverError::NotFound(name.to_string()))
    }

    async fn get_cluster_manifests(
        &self,
        account: &str,
        location: &str,
        kind: &str,
        app: &str,
        cluster: &str,
    ) -> Result<Vec<ManifestCoordinates>, ClouddriverError> {
        self.record(format!(
            "getClusterManifests {account} {location} {kind} {app} {cluster}"
        ));
        Ok(self.cluster.clone())
    }

    async fn fetch_artifact(&self, artifact: &Artifact) -> Result<Vec<u8>, ClouddriverError> {
        let reference = artifact.reference.clone().unwrap_or_default();
        self.record(format!("fetchArtifact {reference}"));
        self.artifacts
            .get(&reference)
            .map(|content| content.clone().into_bytes())
            .ok_or_else(|| ClouddriverError::NotFound(reference))
    }
}

/// Front50 fake knowing a fixed set of applications.
#[derive(Default)]
pub struct FakeFront50 {
    pub applications: Vec<String>,
}

#[async_trait]
impl Front50Service for FakeFront50 {
    async fn get_application(&self, name: &str) -> Result<Option<Application>, ClouddriverError> {
        Ok(self
            .applications
            .iter()
            .any(|app| app == name)
            .then(|| Application {
                name: name.to_string(),
                email: None,
                details: Map::new(),
            }))
    }
}

/// A manifest with the given stability flags and available replicas.
pub fn live_manifest(stable: bool, failed: Option<&str>, available_replicas: i64) -> Manifest {
    Manifest {
        manifest: serde_json::json!({"status": {"availableReplicas": available_replicas}}),
        status: ManifestStatus {
            stable: Condition::new(stable, None),
            failed: Condition::new(failed.is_some(), failed),
            ..ManifestStatus::default()
        },
        ..Manifest::default()
    }
}

pub struct Fakes {
    pub kato: Arc<FakeKato>,
    pub oort: Arc<FakeOort>,
    pub front50: Arc<FakeFront50>,
}

impl Fakes {
    pub fn new(kato: FakeKato, oort: FakeOort) -> Self {
        Self {
            kato: Arc::new(kato),
            oort: Arc::new(oort),
            front50: Arc::new(FakeFront50 {
                applications: vec![APPLICATION.to_string()],
            }),
        }
    }

    pub fn services(&self, config: PropertyConfig) -> ManifestServices {
        ManifestServices::new(
            self.kato.clone(),
            self.oort.clone(),
            self.front50.clone(),
            Arc::new(config),
        )
    }
}
