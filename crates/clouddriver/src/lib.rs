//! Clients for the services a deployment pipeline talks to.
//!
//! - **Kato**: submits cloud operations (`deployManifest`, `patchManifest`, ...)
//!   and reports on the resulting tasks
//! - **Oort**: the read side of Clouddriver (live manifests, cluster
//!   membership, artifact content)
//! - **Front50**: application metadata
//!
//! Each service is a trait so tasks can be exercised against fakes; the
//! HTTP implementations live in [`client`].
//!
//! # Configuration
//!
//! - `CLOUDDRIVER_URL`: Clouddriver base URL (default `http://localhost:7002`)
//! - `CLOUDDRIVER_OORT_URL`: separate read-only Clouddriver, if any
//! - `FRONT50_URL`: Front50 base URL (default `http://localhost:8080`)
//! - `SERVICE_TIMEOUT_SECS`: request timeout (default 30)

pub mod artifacts;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use artifacts::ArtifactFetcher;
pub use client::{ClouddriverClient, Front50Client};
pub use config::ServiceConfig;
pub use error::ClouddriverError;
pub use models::{
    Application, Condition, KatoTask, KatoTaskStatus, Manifest, ManifestCoordinates,
    ManifestStatus, Moniker, TaskHistory, TaskId, TaskOwner, Warning,
};
pub use services::{Front50Service, KatoService, OortService};
