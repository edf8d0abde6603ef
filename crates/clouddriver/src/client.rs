//! HTTP implementations of the service traits.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::Artifact;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::error::ClouddriverError;
use crate::models::{Application, KatoTask, Manifest, ManifestCoordinates, TaskId, TaskOwner};
use crate::services::{Front50Service, KatoService, OortService};

fn parse_base(url: &str) -> Result<Url, ClouddriverError> {
    Url::parse(url).map_err(|e| ClouddriverError::Config(format!("invalid base URL {url}: {e}")))
}

/// Append path segments to `base`, percent-encoding each one.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ClouddriverError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ClouddriverError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Shared request plumbing for the JSON services.
#[derive(Clone)]
struct JsonClient {
    client: Client,
}

impl JsonClient {
    fn new(timeout_secs: u64) -> Result<Self, ClouddriverError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClouddriverError> {
        debug!(url = %url, "GET request");
        let response = self.client.get(url).send().await?;
        Self::handle_response(response).await
    }

    async fn send<T, B>(&self, method: Method, url: Url, body: &B) -> Result<T, ClouddriverError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        debug!(method = %method, url = %url, "Request");
        let response = self.client.request(method, url).json(body).send().await?;
        Self::handle_response(response).await
    }

    async fn send_for_bytes<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<Vec<u8>, ClouddriverError> {
        debug!(method = %method, url = %url, "Request (raw response)");
        let response = self.client.request(method, url).json(body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.bytes().await?.to_vec());
        }
        let text = response.text().await.unwrap_or_default();
        Err(Self::status_error(status, text))
    }

    /// Parse a JSON body or map the status to an error.
    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClouddriverError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&text).map_err(|e| {
                warn!(error = %e, body = %text, "Failed to parse response");
                ClouddriverError::Serialization(e)
            })
        } else {
            Err(Self::status_error(status, text))
        }
    }

    fn status_error(status: StatusCode, text: String) -> ClouddriverError {
        if status == StatusCode::NOT_FOUND {
            ClouddriverError::NotFound(text)
        } else {
            ClouddriverError::Api {
                status: status.as_u16(),
                message: text,
            }
        }
    }
}

/// Clouddriver client: Kato operations plus Oort reads.
#[derive(Clone)]
pub struct ClouddriverClient {
    http: JsonClient,
    kato_base: Url,
    oort_base: Url,
}

impl ClouddriverClient {
    /// Create a client from endpoint configuration.
    ///
    /// # Errors
    /// Returns error if a base URL is invalid or the HTTP client cannot be created.
    pub fn new(config: &ServiceConfig) -> Result<Self, ClouddriverError> {
        Ok(Self {
            http: JsonClient::new(config.timeout_secs)?,
            kato_base: parse_base(&config.clouddriver_url)?,
            oort_base: parse_base(config.oort_base_url())?,
        })
    }
}

#[async_trait]
impl KatoService for ClouddriverClient {
    async fn request_operations(
        &self,
        cloud_provider: &str,
        operations: &[Value],
    ) -> Result<TaskId, ClouddriverError> {
        info!(
            cloud_provider = %cloud_provider,
            operations = operations.len(),
            "Submitting operations"
        );
        let url = endpoint(&self.kato_base, &[cloud_provider, "ops"])?;
        self.http.send(Method::POST, url, operations).await
    }

    async fn lookup_task(&self, id: &str) -> Result<KatoTask, ClouddriverError> {
        let url = endpoint(&self.kato_base, &["task", id])?;
        self.http.get(url).await
    }

    async fn lookup_task_owner(
        &self,
        cloud_provider: &str,
        id: &str,
    ) -> Result<TaskOwner, ClouddriverError> {
        let url = endpoint(&self.kato_base, &[cloud_provider, "task", id, "owner"])?;
        self.http.get(url).await
    }

    async fn update_task_retryability(
        &self,
        cloud_provider: &str,
        id: &str,
        retryable: bool,
    ) -> Result<KatoTask, ClouddriverError> {
        let url = endpoint(&self.kato_base, &[cloud_provider, "task", id, "retryable"])?;
        self.http
            .send(Method::PUT, url, &json!({ "retryable": retryable }))
            .await
    }

    async fn restart_task(
        &self,
        cloud_provider: &str,
        id: &str,
        operations: &[Value],
    ) -> Result<KatoTask, ClouddriverError> {
        info!(cloud_provider = %cloud_provider, task_id = %id, "Restarting task");
        let url = endpoint(&self.kato_base, &[cloud_provider, "task", id, "restart"])?;
        self.http.send(Method::POST, url, operations).await
    }

    async fn resume_task(&self, id: &str) -> Result<TaskId, ClouddriverError> {
        info!(task_id = %id, "Resuming task");
        let resume = format!("{id}:resume");
        let url = endpoint(&self.kato_base, &["task", resume.as_str()])?;
        self.http.send(Method::POST, url, &json!({})).await
    }
}

#[async_trait]
impl OortService for ClouddriverClient {
    async fn get_manifest(
        &self,
        account: &str,
        location: &str,
        name: &str,
        include_events: bool,
    ) -> Result<Manifest, ClouddriverError> {
        let mut url = endpoint(&self.oort_base, &["manifests", account, location, name])?;
        url.query_pairs_mut()
            .append_pair("includeEvents", if include_events { "true" } else { "false" });
        self.http.get(url).await
    }

    async fn get_cluster_manifests(
        &self,
        account: &str,
        location: &str,
        kind: &str,
        app: &str,
        cluster: &str,
    ) -> Result<Vec<ManifestCoordinates>, ClouddriverError> {
        let url = endpoint(
            &self.oort_base,
            &["manifests", account, location, kind, "cluster", app, cluster],
        )?;
        self.http.get(url).await
    }

    async fn fetch_artifact(&self, artifact: &Artifact) -> Result<Vec<u8>, ClouddriverError> {
        debug!(
            artifact_type = ?artifact.artifact_type,
            reference = ?artifact.reference,
            "Fetching artifact"
        );
        let url = endpoint(&self.oort_base, &["artifacts", "fetch", ""])?;
        self.http.send_for_bytes(Method::PUT, url, artifact).await
    }
}

/// Front50 client.
#[derive(Clone)]
pub struct Front50Client {
    http: JsonClient,
    base: Url,
}

impl Front50Client {
    /// # Errors
    /// Returns error if the base URL is invalid or the HTTP client cannot be created.
    pub fn new(config: &ServiceConfig) -> Result<Self, ClouddriverError> {
        Ok(Self {
            http: JsonClient::new(config.timeout_secs)?,
            base: parse_base(&config.front50_url)?,
        })
    }
}

#[async_trait]
impl Front50Service for Front50Client {
    async fn get_application(&self, name: &str) -> Result<Option<Application>, ClouddriverError> {
        let url = endpoint(&self.base, &["v2", "applications", name])?;
        match self.http.get(url).await {
            Ok(application) => Ok(Some(application)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_segments() {
        let base = Url::parse("http://clouddriver:7002/").unwrap();
        let url = endpoint(&base, &["manifests", "k8s", "default", "pod web-1"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://clouddriver:7002/manifests/k8s/default/pod%20web-1"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let base = Url::parse("http://gateway/clouddriver").unwrap();
        let url = endpoint(&base, &["task", "42"]).unwrap();
        assert_eq!(url.as_str(), "http://gateway/clouddriver/task/42");
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let config = ServiceConfig {
            clouddriver_url: "not a url".into(),
            ..ServiceConfig::default()
        };
        assert!(matches!(
            ClouddriverClient::new(&config),
            Err(ClouddriverError::Config(_))
        ));
    }
}
