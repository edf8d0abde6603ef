//! Manifest stages for deployment pipelines.
//!
//! A `deployManifest` stage resolves its manifests (inline text or a fetched
//! artifact, with `${ … }` expressions evaluated), submits them to Kato,
//! monitors the resulting task, promotes what Clouddriver reported into the
//! stage outputs and waits for the manifests to become stable. With traffic
//! management enabled it then disables or deletes older versions of the same
//! cluster.
//!
//! `patchManifest`, `deleteManifest` and `disableManifest` follow the same
//! submit/monitor/promote shape.
//!
//! # Dynamic configuration
//!
//! - `stages.deploy-manifest-stage.check-if-application-exists`
//! - `tasks.check-if-application-exists.enabled`
//! - `tasks.monitor-kato-task.terminal-retries`
//! - `tasks.monitor-kato-task.kubernetes.deploy-manifest.*`
//! - `tasks.wait-for-manifest-stable.timeout-ms`

pub mod context;
pub mod error;
pub mod evaluator;
pub mod services;
pub mod stages;
pub mod tasks;

pub use context::{
    BindArtifact, DeleteManifestContext, DeployManifestContext, ManifestContext,
    ManifestStrategy, ManifestTarget, MergeStrategy, PatchManifestContext, Source,
};
pub use error::ManifestError;
pub use evaluator::{EvaluatedManifests, ManifestEvaluator};
pub use services::ManifestServices;
pub use stages::registry;
