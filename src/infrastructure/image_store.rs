//! Image persistence collaborators

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::domain::services::{ImageJob, ImageStore};
use crate::error::RemoteError;
use crate::infrastructure::network_context::NetworkContext;

/// Posts each job as JSON to an image service.
pub struct HttpImageStore {
    client: Client,
    endpoint: String,
}

impl HttpImageStore {
    pub fn new(network: &NetworkContext, endpoint: impl Into<String>) -> Self {
        Self {
            client: network.direct().clone(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ImageStore for HttpImageStore {
    async fn persist(&self, job: &ImageJob) -> Result<(), RemoteError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(job)
            .send()
            .await
            .map_err(|e| RemoteError::transport(&self.endpoint, &e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::http(status.as_u16(), body, &self.endpoint));
        }
        Ok(())
    }
}

/// Used when no image service is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogImageStore;

#[async_trait]
impl ImageStore for LogImageStore {
    async fn persist(&self, job: &ImageJob) -> Result<(), RemoteError> {
        debug!(
            "No image service, skipping {} image(s) of {}",
            job.image_urls.len(),
            job.remote_id
        );
        Ok(())
    }
}
