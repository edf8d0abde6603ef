//! `deployctl.yaml` loading.
//!
//! ```yaml
//! services:
//!   clouddriverUrl: http://clouddriver:7002
//!   front50Url: http://front50:8080
//! properties:
//!   tasks:
//!     monitor-kato-task:
//!       kubernetes.deploy-manifest.retry-task: true
//! ```

use std::path::{Path, PathBuf};

use clouddriver::ServiceConfig;
use pipeline::PropertyConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Environment variable naming the config file.
pub const ENV_CONFIG_PATH: &str = "DEPLOYCTL_CONFIG";

/// Errors loading `deployctl` input files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Read and deserialize a YAML file.
pub(crate) fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Contents of `deployctl.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub services: ServiceConfig,
    /// Dynamic configuration tree, flattened into dotted keys.
    pub properties: Value,
}

impl AppConfig {
    /// Load `path` if given, otherwise defaults. Service endpoints from the
    /// environment win over the file.
    pub fn load(path: Option<&Path>) -> Result<Self, LoadError> {
        let mut config = match path {
            Some(path) => {
                debug!(path = %path.display(), "Loading config file");
                read_yaml::<Self>(path)?
            }
            None => Self::default(),
        };
        config.services = config.services.with_env_overrides();
        Ok(config)
    }

    /// Dynamic configuration: file properties, overridable from the
    /// environment.
    pub fn dynamic_config(&self) -> PropertyConfig {
        PropertyConfig::from_value(&self.properties).with_env_overrides()
    }
}
