//! Alert delivery
//!
//! Alerts are fire-and-forget: a webhook that cannot be reached is logged and
//! the run carries on.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::domain::services::{Alerter, Severity};
use crate::infrastructure::network_context::NetworkContext;

/// Chat webhook payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertPayload<'a> {
    pub title: &'a str,
    pub text: &'a str,
    pub severity: Severity,
    pub color: &'static str,
}

impl Severity {
    pub fn color(self) -> &'static str {
        match self {
            Self::Info => "#2eb886",
            Self::Warning => "#daa038",
            Self::Error => "#a30200",
        }
    }
}

/// First line of the message, used as the card title.
fn title_of(message: &str) -> &str {
    message.lines().next().unwrap_or(message)
}

pub struct WebhookAlerter {
    client: Client,
    webhook_url: String,
}

impl WebhookAlerter {
    pub fn new(network: &NetworkContext, webhook_url: impl Into<String>) -> Self {
        Self {
            client: network.direct().clone(),
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl Alerter for WebhookAlerter {
    async fn notify(&self, message: &str, severity: Severity) {
        let payload = AlertPayload {
            title: title_of(message),
            text: message,
            severity,
            color: severity.color(),
        };
        match self.client.post(&self.webhook_url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Alert delivered: {}", payload.title);
            }
            Ok(response) => warn!("Alert webhook answered {}", response.status()),
            Err(e) => warn!("Alert webhook unreachable: {e}"),
        }
    }
}

/// Writes alerts to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlerter;

#[async_trait]
impl Alerter for LogAlerter {
    async fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => info!(alert = true, "{message}"),
            Severity::Warning => warn!(alert = true, "{message}"),
            Severity::Error => error!(alert = true, "{message}"),
        }
    }
}
