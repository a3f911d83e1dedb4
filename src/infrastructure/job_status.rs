//! Job liveness from a Scrapyd-compatible job service

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::domain::services::{JobState, JobStatusProvider};
use crate::error::{ConfigError, RemoteError};
use crate::infrastructure::config::JobStatusConfig;
use crate::infrastructure::network_context::NetworkContext;

#[derive(Debug, Default, Deserialize)]
struct ListJobs {
    #[serde(default)]
    pending: Vec<JobEntry>,
    #[serde(default)]
    running: Vec<JobEntry>,
    #[serde(default)]
    finished: Vec<JobEntry>,
}

#[derive(Debug, Deserialize)]
struct JobEntry {
    id: String,
}

impl ListJobs {
    fn state_of(&self, job_id: &str) -> JobState {
        let listed = |jobs: &[JobEntry]| jobs.iter().any(|job| job.id == job_id);
        if listed(&self.running) {
            JobState::Running
        } else if listed(&self.pending) {
            JobState::Pending
        } else if listed(&self.finished) {
            JobState::Finished
        } else {
            JobState::Unknown
        }
    }
}

pub struct ScrapydJobStatus {
    client: Client,
    list_url: Url,
}

impl ScrapydJobStatus {
    pub fn new(network: &NetworkContext, settings: &JobStatusConfig) -> Result<Self, ConfigError> {
        let base = settings.base_url.trim_end_matches('/');
        let list_url = Url::parse(&format!("{base}/listjobs.json")).map_err(|e| {
            ConfigError::InvalidUrl {
                url: settings.base_url.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            client: network.direct().clone(),
            list_url,
        })
    }
}

#[async_trait]
impl JobStatusProvider for ScrapydJobStatus {
    async fn status(&self, project: &str, job_id: &str) -> Result<JobState, RemoteError> {
        let url = self.list_url.as_str();
        let response = self
            .client
            .get(self.list_url.clone())
            .query(&[("project", project)])
            .send()
            .await
            .map_err(|e| RemoteError::transport(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::http(status.as_u16(), body, url));
        }

        let jobs: ListJobs = response
            .json()
            .await
            .map_err(|e| RemoteError::decode(url, e.to_string()))?;
        let state = jobs.state_of(job_id);
        debug!("Job {job_id} in project {project} is {state:?}");
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::RemoteStoreConfig;
    use httpmock::prelude::*;
    use serde_json::json;

    fn provider(server: &MockServer) -> ScrapydJobStatus {
        let network =
            NetworkContext::new(&RemoteStoreConfig::default()).unwrap();
        let settings = JobStatusConfig {
            base_url: server.base_url(),
            ..JobStatusConfig::default()
        };
        ScrapydJobStatus::new(&network, &settings).unwrap()
    }

    #[tokio::test]
    async fn resolves_state_from_job_lists() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/listjobs.json")
                    .query_param("project", "shops");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "pending": [{ "id": "p1" }],
                    "running": [{ "id": "r1" }],
                    "finished": [{ "id": "f1" }]
                }));
            })
            .await;

        let provider = provider(&server);
        assert_eq!(provider.status("shops", "r1").await.unwrap(), JobState::Running);
        assert_eq!(provider.status("shops", "p1").await.unwrap(), JobState::Pending);
        assert_eq!(provider.status("shops", "f1").await.unwrap(), JobState::Finished);
        assert_eq!(provider.status("shops", "zz").await.unwrap(), JobState::Unknown);
        mock.assert_hits_async(4).await;
    }

    #[tokio::test]
    async fn service_errors_are_propagated() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/listjobs.json");
                then.status(500);
            })
            .await;

        let err = provider(&server).status("shops", "r1").await.unwrap_err();
        assert!(matches!(err, RemoteError::Http { status: 500, .. }));
    }
}
