//! reqwest-backed [`RemoteStore`]
//!
//! Every call goes through the direct (unproxied) client of the
//! [`NetworkContext`]. Non-2xx responses come back as [`RemoteError::Http`];
//! deciding whether that matters is the caller's business.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::domain::run_state::IterationStatus;
use crate::domain::services::{IterationInfo, RemoteStore, StoreReceipt};
use crate::domain::value_objects::JobId;
use crate::error::{ConfigError, RemoteError};
use crate::infrastructure::config::RemoteStoreConfig;
use crate::infrastructure::network_context::NetworkContext;

pub struct HttpRemoteStore {
    client: Client,
    base_url: Url,
    credentials: Option<(String, Option<String>)>,
}

impl HttpRemoteStore {
    pub fn new(network: &NetworkContext, settings: &RemoteStoreConfig) -> Result<Self, ConfigError> {
        let raw = settings
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingRemoteStoreUrl)?;

        // join() replaces the last segment unless the base ends with '/'
        let normalized = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{raw}/")
        };
        let base_url = Url::parse(&normalized).map_err(|e| ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client: network.direct().clone(),
            base_url,
            credentials: settings
                .username
                .clone()
                .map(|user| (user, settings.password.clone())),
        })
    }

    fn endpoint(&self, merchant: &str, action: &str) -> Result<Url, RemoteError> {
        self.base_url
            .join(&format!("merchant/{merchant}/{action}"))
            .map_err(|e| RemoteError::decode(self.base_url.as_str(), e.to_string()))
    }

    async fn get(&self, merchant: &str, action: &str) -> Result<Value, RemoteError> {
        let url = self.endpoint(merchant, action)?;
        self.send(self.client.get(url.clone()), &url).await
    }

    async fn post(&self, merchant: &str, action: &str, body: &Value) -> Result<Value, RemoteError> {
        let url = self.endpoint(merchant, action)?;
        self.send(self.client.post(url.clone()).json(body), &url).await
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Value, RemoteError> {
        let request = match &self.credentials {
            Some((user, password)) => request.basic_auth(user, password.as_ref()),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::transport(url.as_str(), &e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::transport(url.as_str(), &e))?;

        if !status.is_success() {
            return Err(RemoteError::http(status.as_u16(), body, url.as_str()));
        }
        debug!("{url} -> {status}");

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| RemoteError::decode(url.as_str(), e.to_string()))
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn product_count(&self, merchant: &str) -> Result<u64, RemoteError> {
        let body = self.get(merchant, "count").await?;
        body.get("count").and_then(Value::as_u64).ok_or_else(|| {
            RemoteError::decode(
                &format!("merchant/{merchant}/count"),
                format!("response has no numeric 'count': {body}"),
            )
        })
    }

    async fn new_iteration(&self, merchant: &str, job_id: &JobId) -> Result<(), RemoteError> {
        let body = json!({ "merchant_id": merchant, "job_id": job_id.as_str() });
        self.post(merchant, "new_crawl_iteration", &body).await?;
        Ok(())
    }

    async fn end_iteration(
        &self,
        merchant: &str,
        status: IterationStatus,
        stats: Option<Value>,
    ) -> Result<(), RemoteError> {
        let body = json!({ "status": status, "stats": stats.unwrap_or(Value::Null) });
        self.post(merchant, "end_crawl_iteration", &body).await?;
        Ok(())
    }

    async fn latest_iteration(&self, merchant: &str) -> Result<Option<IterationInfo>, RemoteError> {
        let body = self.get(merchant, "get_latest_iteration").await?;
        // A merchant that never ran has no iteration to report.
        if body.get("status").is_none_or(Value::is_null) {
            return Ok(None);
        }
        serde_json::from_value(body).map(Some).map_err(|e| {
            RemoteError::decode(&format!("merchant/{merchant}/get_latest_iteration"), e.to_string())
        })
    }

    async fn add_crawled_product(
        &self,
        merchant: &str,
        product: &Value,
    ) -> Result<StoreReceipt, RemoteError> {
        let body = self.post(merchant, "add_crawled_product", product).await?;
        let already_in_db = match body.get("already_in_db") {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(n)) => n.as_u64().is_some_and(|n| n > 0),
            _ => false,
        };
        Ok(StoreReceipt { already_in_db })
    }

    async fn clean_crawled_products(&self, merchant: &str, job_id: &JobId) -> Result<(), RemoteError> {
        let body = json!({ "job_id": job_id.as_str() });
        self.post(merchant, "clean_crawled_products", &body).await?;
        Ok(())
    }

    async fn delete_out_of_stock(&self, merchant: &str, remote_id: &str) -> Result<(), RemoteError> {
        let body = json!({ "remote_id": remote_id });
        self.post(merchant, "delete_out_of_stock", &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn store(server: &MockServer) -> HttpRemoteStore {
        let settings = RemoteStoreConfig {
            base_url: Some(format!("{}/api", server.base_url())),
            username: Some("crawler".into()),
            password: Some("pw".into()),
            api_token: Some("secret".into()),
            country: Some("EG".into()),
            ..RemoteStoreConfig::default()
        };
        let network = NetworkContext::new(&settings).unwrap();
        HttpRemoteStore::new(&network, &settings).unwrap()
    }

    #[tokio::test]
    async fn count_sends_credentials() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/merchant/acme/count")
                    .header("app-token", "secret")
                    .header("country-code", "EG")
                    .header_exists("authorization");
                then.status(200).json_body(json!({ "count": 42 }));
            })
            .await;

        assert_eq!(store(&server).product_count("acme").await.unwrap(), 42);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn count_without_count_field_is_a_decode_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/merchant/acme/count");
                then.status(200).json_body(json!({ "total": 42 }));
            })
            .await;

        let err = store(&server).product_count("acme").await.unwrap_err();
        assert!(matches!(err, RemoteError::Decode { .. }));
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/merchant/acme/clean_crawled_products");
                then.status(503).body("maintenance");
            })
            .await;

        let err = store(&server)
            .clean_crawled_products("acme", &JobId::new("job-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn add_product_reports_already_in_db() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/merchant/acme/add_crawled_product")
                    .json_body(json!({ "remote_id": "A1" }));
                then.status(200).json_body(json!({ "already_in_db": 1 }));
            })
            .await;

        let receipt = store(&server)
            .add_crawled_product("acme", &json!({ "remote_id": "A1" }))
            .await
            .unwrap();
        assert!(receipt.already_in_db);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn latest_iteration_reads_status_and_job() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/merchant/acme/get_latest_iteration");
                then.status(200)
                    .json_body(json!({ "status": "CRAWLING", "kipp_job": "job-9" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/merchant/fresh/get_latest_iteration");
                then.status(200).json_body(json!({}));
            })
            .await;

        let store = store(&server);
        let latest = store.latest_iteration("acme").await.unwrap().unwrap();
        assert_eq!(latest.status, IterationStatus::Crawling);
        assert_eq!(latest.job_id.as_deref(), Some("job-9"));
        assert_eq!(store.latest_iteration("fresh").await.unwrap(), None);
    }

    #[tokio::test]
    async fn iteration_bodies_carry_job_and_status() {
        let server = MockServer::start_async().await;
        let started = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/merchant/acme/new_crawl_iteration")
                    .json_body(json!({ "merchant_id": "acme", "job_id": "job-1" }));
                then.status(200);
            })
            .await;
        let ended = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/merchant/acme/end_crawl_iteration")
                    .json_body(json!({ "status": "error", "stats": null }));
                then.status(200);
            })
            .await;

        let store = store(&server);
        store.new_iteration("acme", &JobId::new("job-1")).await.unwrap();
        store
            .end_iteration("acme", IterationStatus::Error, None)
            .await
            .unwrap();
        started.assert_async().await;
        ended.assert_async().await;
    }

    #[test]
    fn missing_base_url_is_a_config_error() {
        let settings = RemoteStoreConfig::default();
        let network = NetworkContext::new(&settings).unwrap();
        assert!(matches!(
            HttpRemoteStore::new(&network, &settings),
            Err(ConfigError::MissingRemoteStoreUrl)
        ));
    }
}
