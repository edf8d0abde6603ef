//! Service endpoint configuration.

use serde::{Deserialize, Serialize};

/// Environment variable for the Clouddriver (Kato) base URL.
const ENV_CLOUDDRIVER_URL: &str = "CLOUDDRIVER_URL";
/// Environment variable for a separate Oort (read) base URL.
const ENV_OORT_URL: &str = "CLOUDDRIVER_OORT_URL";
/// Environment variable for the Front50 base URL.
const ENV_FRONT50_URL: &str = "FRONT50_URL";
/// Environment variable for the request timeout in seconds.
const ENV_TIMEOUT_SECS: &str = "SERVICE_TIMEOUT_SECS";

const DEFAULT_CLOUDDRIVER_URL: &str = "http://localhost:7002";
const DEFAULT_FRONT50_URL: &str = "http://localhost:8080";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where the downstream services live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    /// Clouddriver base URL used for operations and task lookups.
    pub clouddriver_url: String,
    /// Read-only Clouddriver base URL; defaults to `clouddriver_url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oort_url: Option<String>,
    pub front50_url: String,
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            clouddriver_url: DEFAULT_CLOUDDRIVER_URL.to_string(),
            oort_url: None,
            front50_url: DEFAULT_FRONT50_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ServiceConfig {
    /// Load from environment variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply any endpoint environment variables on top of `self`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(ENV_CLOUDDRIVER_URL) {
            self.clouddriver_url = url;
        }
        if let Ok(url) = std::env::var(ENV_OORT_URL) {
            self.oort_url = Some(url);
        }
        if let Ok(url) = std::env::var(ENV_FRONT50_URL) {
            self.front50_url = url;
        }
        self.timeout_secs = std::env::var(ENV_TIMEOUT_SECS)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.timeout_secs);
        self
    }

    pub fn oort_base_url(&self) -> &str {
        self.oort_url.as_deref().unwrap_or(&self.clouddriver_url)
    }
}
