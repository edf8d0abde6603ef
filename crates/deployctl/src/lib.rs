//! Building blocks of the `deployctl` binary: config loading, pipeline
//! definitions and console summaries.

pub mod config;
pub mod definition;
pub mod summary;

pub use config::{AppConfig, LoadError};
pub use definition::{PipelineDefinition, ResolveRequest, StageDefinition};
