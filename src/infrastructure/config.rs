//! Configuration infrastructure
//!
//! Process-level settings are layered with the `config` crate:
//! 1. Built-in defaults (`#[serde(default)]` on every section)
//! 2. Optional config file (`product-ingest.toml` / `.json` / `.yaml`)
//! 3. Environment variables prefixed `PRODUCT_INGEST__`, sections separated
//!    by `__` (e.g. `PRODUCT_INGEST__REMOTE_STORE__BASE_URL`)
//!
//! Per-site settings live in JSON site files, see [`crate::domain::site`].

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::ConfigError;
use crate::iteration::controller::ControllerSettings;
use crate::pipeline::sink::SinkConfig;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Job id of this crawl; generated when absent.
    pub job_id: Option<String>,

    /// Job-service project the crawl jobs belong to
    pub project: String,

    /// Percentage of known products allowed to go unseen before cleanup is skipped
    pub default_deletion_threshold: f64,

    /// Zero-price share of the starting db count that is logged as an error
    pub zero_price_alert_percent: f64,

    pub remote_store: RemoteStoreConfig,
    pub job_status: JobStatusConfig,
    pub alerting: AlertingConfig,
    pub markers: MarkerConfig,
    pub sink: SinkConfig,
    pub images: ImagesConfig,
    pub logging: LoggingConfig,
}

/// Remote product store connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteStoreConfig {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sent as `App-Token`
    pub api_token: Option<String>,
    /// Sent as `Country-Code`
    pub country: Option<String>,
    pub user_agent: String,
    pub verify_ssl: bool,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobStatusConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// Chat webhook; alerts only go to the log when unset.
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    /// Image service endpoint; jobs are only logged when unset.
    pub endpoint: Option<String>,
    pub workers: usize,
    pub queue_capacity: usize,
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for daily rolling log files
    pub log_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            job_id: None,
            project: defaults::PROJECT.into(),
            default_deletion_threshold: defaults::DELETION_THRESHOLD,
            zero_price_alert_percent: defaults::ZERO_PRICE_ALERT_PERCENT,
            remote_store: RemoteStoreConfig::default(),
            job_status: JobStatusConfig::default(),
            alerting: AlertingConfig::default(),
            markers: MarkerConfig::default(),
            sink: SinkConfig {
                collection: defaults::SINK_COLLECTION.into(),
                ..SinkConfig::default()
            },
            images: ImagesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RemoteStoreConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            username: None,
            password: None,
            api_token: None,
            country: None,
            user_agent: defaults::USER_AGENT.into(),
            verify_ssl: true,
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
        }
    }
}

impl Default for JobStatusConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::JOB_SERVICE_URL.into(),
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
        }
    }
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(defaults::MARKER_DIR),
        }
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            workers: defaults::IMAGE_WORKERS,
            queue_capacity: defaults::IMAGE_QUEUE_CAPACITY,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: PathBuf::from(defaults::LOG_DIR),
        }
    }
}

impl AppConfig {
    /// Load from `path` (or `product-ingest.*` in the working directory when
    /// present) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(
            path,
            Environment::with_prefix(defaults::ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
    }

    pub(crate) fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(defaults::CONFIG_FILE_STEM).required(false),
        };
        let config: AppConfig = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        info!(
            "Configuration loaded (remote store: {})",
            config.remote_store.base_url.as_deref().unwrap_or_default()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.remote_store.base_url.as_deref().map(str::trim) {
            None | Some("") => return Err(ConfigError::MissingRemoteStoreUrl),
            Some(url) => {
                url::Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
            }
        }
        self.sink.validate()?;
        if !self.logging.console_output && !self.logging.file_output {
            return Err(ConfigError::invalid_value(
                "logging",
                "at least one of console_output and file_output must be enabled",
            ));
        }
        for (field, value) in [
            ("default_deletion_threshold", self.default_deletion_threshold),
            ("zero_price_alert_percent", self.zero_price_alert_percent),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::invalid_value(field, format!("{value} is not a percentage")));
            }
        }
        Ok(())
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            project: self.project.clone(),
            default_deletion_threshold: self.default_deletion_threshold,
            zero_price_alert_percent: self.zero_price_alert_percent,
        }
    }
}

/// Default configuration values
pub mod defaults {
    /// Environment variable prefix
    pub const ENV_PREFIX: &str = "PRODUCT_INGEST";

    /// Config file looked up in the working directory (any supported extension)
    pub const CONFIG_FILE_STEM: &str = "product-ingest";

    pub const PROJECT: &str = "product_ingest";

    /// Default deletion threshold in percent
    pub const DELETION_THRESHOLD: f64 = 25.0;

    /// Default zero-price alert share in percent
    pub const ZERO_PRICE_ALERT_PERCENT: f64 = 30.0;

    pub const SINK_COLLECTION: &str = "items";

    pub const USER_AGENT: &str = "product-ingest/0.3";

    /// Default request timeout in seconds
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    pub const JOB_SERVICE_URL: &str = "http://localhost:6800";

    pub const MARKER_DIR: &str = "markers";

    pub const LOG_DIR: &str = "logs";

    pub const IMAGE_WORKERS: usize = 4;

    pub const IMAGE_QUEUE_CAPACITY: usize = 64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Environment::with_prefix(defaults::ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(Some(map))
    }

    #[test]
    fn missing_remote_store_url_is_fatal() {
        let err = AppConfig::load_with_env(None, env(&[])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingRemoteStoreUrl)
        ));
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "project = \"shops\"\n[remote_store]\nbase_url = \"http://file.example/api/\"\n[sink]\ncollection = \"products\"\nbuffer_size = 50"
        )
        .unwrap();

        let config = AppConfig::load_with_env(
            Some(file.path()),
            env(&[
                ("PRODUCT_INGEST__REMOTE_STORE__BASE_URL", "http://env.example/api/"),
                ("PRODUCT_INGEST__DEFAULT_DELETION_THRESHOLD", "40"),
            ]),
        )
        .unwrap();

        assert_eq!(config.project, "shops");
        assert_eq!(
            config.remote_store.base_url.as_deref(),
            Some("http://env.example/api/")
        );
        assert!((config.default_deletion_threshold - 40.0).abs() < f64::EPSILON);
        assert_eq!(config.sink.buffer_size, Some(50));
        assert_eq!(config.sink.collection, "products");
        assert!(config.remote_store.verify_ssl);
    }

    #[test]
    fn conflicting_sink_is_rejected() {
        let mut config = AppConfig::default();
        config.remote_store.base_url = Some("http://store.example".into());
        config.sink.buffer_size = Some(10);
        config.sink.unique_key = Some("remote_id".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ConflictingSink { .. })
        ));
    }

    #[test]
    fn logging_needs_an_output() {
        let mut config = AppConfig::default();
        config.remote_store.base_url = Some("http://store.example".into());
        config.logging.console_output = false;
        assert!(config.validate().is_err());
    }
}
