//! HTTP client shared by the collaborator adapters
//!
//! The crawl process usually exports `http_proxy`/`https_proxy` for page
//! traffic. Calls to the remote store, job service, image service and alert
//! webhook must never go through that proxy, so every adapter takes its client
//! from a [`NetworkContext`], which is built with the proxy disabled instead of
//! clearing the process environment around each call.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::infrastructure::config::RemoteStoreConfig;

/// Store credentials are sent as these headers on every call.
pub const APP_TOKEN_HEADER: HeaderName = HeaderName::from_static("app-token");
pub const COUNTRY_CODE_HEADER: HeaderName = HeaderName::from_static("country-code");

#[derive(Debug, Clone)]
pub struct NetworkContext {
    direct: Client,
}

impl NetworkContext {
    pub fn new(settings: &RemoteStoreConfig) -> Result<Self> {
        let direct = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .default_headers(default_headers(settings)?)
            .danger_accept_invalid_certs(!settings.verify_ssl)
            .no_proxy()
            .gzip(true)
            .build()
            .context("Failed to create HTTP client")?;

        if !settings.verify_ssl {
            debug!("TLS certificate verification disabled");
        }

        Ok(Self { direct })
    }

    /// Client that bypasses any proxy from the environment.
    pub fn direct(&self) -> &Client {
        &self.direct
    }
}

fn default_headers(settings: &RemoteStoreConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&settings.user_agent).context("Invalid user agent")?,
    );
    for (name, value) in [
        (APP_TOKEN_HEADER, &settings.api_token),
        (COUNTRY_CODE_HEADER, &settings.country),
    ] {
        if let Some(value) = value {
            let value =
                HeaderValue::from_str(value).with_context(|| format!("Invalid {name} header"))?;
            headers.insert(name, value);
        }
    }
    Ok(headers)
}
