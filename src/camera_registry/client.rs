//! Registry collaborator client
//!
//! `GET  {base}/api/cameras/`            -> `{ "cameras": [...] }`
//! `DELETE {base}/api/cameras/delete/{id}/` -> 2xx on success

use super::types::{CameraDescriptor, CameraListResponse};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;

/// External camera registry
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch the authoritative camera list (idempotent, safe to poll)
    async fn list_cameras(&self) -> Result<Vec<CameraDescriptor>>;

    /// Delete one camera (not idempotent)
    async fn delete_camera(&self, camera_id: &str) -> Result<()>;
}

/// reqwest-backed registry client
pub struct HttpRegistryClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRegistryClient {
    /// Create new registry client
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn list_cameras(&self) -> Result<Vec<CameraDescriptor>> {
        let url = format!("{}/api/cameras/", self.base_url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::FetchFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Error::FetchFailed(format!("HTTP error! status: {}", resp.status())));
        }

        let body: CameraListResponse = resp
            .json()
            .await
            .map_err(|e| Error::FetchFailed(format!("Invalid camera list: {}", e)))?;

        Ok(body.into_descriptors())
    }

    async fn delete_camera(&self, camera_id: &str) -> Result<()> {
        let url = format!(
            "{}/api/cameras/delete/{}/",
            self.base_url,
            urlencoding::encode(camera_id)
        );

        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| Error::DeleteFailed {
                camera_id: camera_id.to_string(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::DeleteFailed {
                camera_id: camera_id.to_string(),
                message: format!("{} {}", status, body.trim()),
            });
        }

        Ok(())
    }
}
