//! JSON/HTTP client for the staging service.

use serde_json::json;

use super::response::{decode, decode_ack, Added, Container, ContainerId, ContainerList};
use super::StagingService;
use crate::config::StagingConfig;
use crate::error::MirrorError;
use crate::http::{json_request, HttpOptions, HttpResponse, Method};

/// `POST /containers`, `GET /containers[/{id}]`, `DELETE /files/{id}`,
/// `DELETE /folders/{id}` relative to the base URL.
#[derive(Debug, Clone)]
pub struct HttpStagingClient {
    base_url: String,
    token: Option<String>,
    opts: HttpOptions,
}

impl HttpStagingClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token,
            opts: HttpOptions::api(),
        }
    }

    pub fn from_config(cfg: &StagingConfig) -> Self {
        Self::new(cfg.base_url.clone(), cfg.token.clone())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<String, MirrorError> {
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| MirrorError::remote(format!("staging base URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| MirrorError::remote(format!("staging base URL {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url.into())
    }

    fn request(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&serde_json::Value>,
    ) -> Result<HttpResponse, MirrorError> {
        let url = self.endpoint(segments)?;
        let headers: Vec<(String, String)> = self
            .token
            .as_ref()
            .map(|t| vec![("Authorization".to_string(), format!("Bearer {}", t))])
            .unwrap_or_default();
        tracing::debug!(?method, url = %url, "staging request");
        json_request(method, &url, &headers, body, &self.opts).map_err(MirrorError::transport)
    }
}

impl StagingService for HttpStagingClient {
    fn add(&self, locator: &str) -> Result<ContainerId, MirrorError> {
        let resp = self.request(Method::Post, &["containers"], Some(&json!({ "locator": locator })))?;
        decode::<Added>(&resp).map(|a| a.container_id)
    }

    fn list_contents(&self, id: &str) -> Result<Container, MirrorError> {
        let resp = self.request(Method::Get, &["containers", id], None)?;
        decode(&resp)
    }

    fn list_all(&self) -> Result<Vec<Container>, MirrorError> {
        let resp = self.request(Method::Get, &["containers"], None)?;
        decode::<ContainerList>(&resp).map(|l| l.containers)
    }

    fn delete_file(&self, id: &str) -> Result<(), MirrorError> {
        let resp = self.request(Method::Delete, &["files", id], None)?;
        decode_ack(&resp)
    }

    fn delete_folder(&self, id: &str) -> Result<(), MirrorError> {
        let resp = self.request(Method::Delete, &["folders", id], None)?;
        decode_ack(&resp)
    }
}
