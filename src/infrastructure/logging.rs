//! Logging system configuration and initialization
//!
//! - Console and/or daily rolling file output
//! - Structured JSON logging (optional)
//! - `RUST_LOG` overrides the configured level and dependency filters

use anyhow::{anyhow, Result};
use chrono::Utc;
use once_cell::sync::Lazy;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

pub use crate::infrastructure::config::LoggingConfig;

/// File name prefix of the rolling log; the appender adds the date.
pub const LOG_FILE_PREFIX: &str = "product-ingest.log";

// Global guards keep the non-blocking writers alive for the process lifetime
static LOG_GUARDS: Lazy<Mutex<Vec<WorkerGuard>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// UTC timestamps with millisecond precision
struct UtcTimeFormatter;

impl FormatTime for UtcTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Utc::now().format("%Y-%m-%d %H:%M:%S%.3f UTC"))
    }
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Builds the filter used when `RUST_LOG` is not set.
///
/// HTTP and runtime internals are held back unless `trace` is requested.
pub fn default_filter(level: &str) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(level)
        .map_err(|e| anyhow!("Invalid log level {level}: {e}"))?;

    if !level.to_lowercase().contains("trace") {
        for directive in ["reqwest=info", "hyper=warn", "h2=warn", "tokio=info"] {
            filter = filter.add_directive(directive.parse()?);
        }
    }
    filter = filter.add_directive(format!("product_ingest={level}").parse()?);
    Ok(filter)
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    if !config.console_output && !config.file_output {
        return Err(anyhow!("No logging output configured"));
    }

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => default_filter(&config.level)?,
    };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.file_output {
        let writer = file_writer(&config.log_dir)?;
        let file_layer = fmt::Layer::new()
            .with_writer(writer)
            .with_timer(UtcTimeFormatter)
            .with_ansi(false);
        if config.json_format {
            layers.push(
                file_layer
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(false)
                    .boxed(),
            );
        } else {
            layers.push(file_layer.with_target(false).boxed());
        }
    }

    if config.console_output {
        let console_layer = fmt::Layer::new()
            .with_writer(console_writer)
            .with_timer(UtcTimeFormatter);
        if config.json_format {
            layers.push(console_layer.json().with_target(true).boxed());
        } else {
            layers.push(console_layer.with_target(false).boxed());
        }
    }

    Registry::default()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    info!("JSON format: {}", config.json_format);
    if config.file_output {
        info!("Log directory: {:?}", config.log_dir);
    }
    Ok(())
}

// stdout carries the CLI's run summaries
fn console_writer() -> std::io::Stderr {
    std::io::stderr()
}

fn file_writer(log_dir: &Path) -> Result<non_blocking::NonBlocking> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| anyhow!("Failed to create log directory {log_dir:?}: {e}"))?;

    let appender = rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = non_blocking(appender);
    LOG_GUARDS
        .lock()
        .map_err(|_| anyhow!("Log guard registry poisoned"))?
        .push(guard);
    Ok(writer)
}

/// Log process information for diagnostics
pub fn log_system_info() {
    info!("=== product-ingest ===");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_logs_to_console() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.console_output);
        assert!(!config.file_output);
    }

    #[test]
    fn default_filter_pins_crate_level() {
        let filter = default_filter("debug").unwrap().to_string();
        assert!(filter.contains("product_ingest=debug"));
        assert!(filter.contains("hyper=warn"));

        let trace = default_filter("trace").unwrap().to_string();
        assert!(!trace.contains("hyper=warn"));
    }

    #[test]
    fn console_layer_writes_to_stderr() {
        use std::io::Write;
        use tracing_subscriber::fmt::MakeWriter;

        let make: fn() -> std::io::Stderr = console_writer;
        let mut writer = make.make_writer();
        assert!(writer.write_all(b"").is_ok());
    }

    #[test]
    fn no_output_is_an_error() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..LoggingConfig::default()
        };
        assert!(init_logging_with_config(&config).is_err());
    }
}
