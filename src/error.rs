//! Error types for the ingest pipeline
//!
//! Fatal problems (bad configuration, a non-numeric price reaching the validity
//! gate) are `thiserror` enums propagated with `?`. Soft drops of individual
//! items are [`Rejection`] values and never travel through `Result::Err` of the
//! run itself.

use thiserror::Error;

/// Configuration defects detected at load or setup time. Always fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Remote store url is not configured")]
    MissingRemoteStoreUrl,

    #[error("Sink buffering cannot be combined with unique key '{unique_key}'")]
    ConflictingSink { unique_key: String },

    #[error("Invalid regex for attribute '{attribute}': {reason}")]
    InvalidRegex { attribute: String, reason: String },

    #[error("Attribute '{attribute}' is misconfigured: {reason}")]
    InvalidAttribute { attribute: String, reason: String },

    #[error("Invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to load configuration from {source_name}: {reason}")]
    Load { source_name: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid_attribute(attribute: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_regex(attribute: &str, err: &regex::Error) -> Self {
        Self::InvalidRegex {
            attribute: attribute.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn invalid_value(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures talking to a remote collaborator (store, job service, webhook).
#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    #[error("HTTP request failed: {status} - {message}")]
    Http {
        status: u16,
        message: String,
        url: String,
    },

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Unexpected response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Local storage error: {message}")]
    Storage { message: String },
}

impl RemoteError {
    pub fn http(status: u16, message: impl Into<String>, url: &str) -> Self {
        Self::Http {
            status,
            message: message.into(),
            url: url.to_string(),
        }
    }

    pub fn transport(url: &str, err: &reqwest::Error) -> Self {
        Self::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    pub fn decode(url: &str, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn storage(err: &std::io::Error) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}

/// Selector evaluation failures raised by a [`crate::extraction::Document`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Unsupported query '{query}': {reason}")]
    UnsupportedQuery { query: String, reason: String },
}

/// Aborts a site run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Non-numeric price '{value}' reached validation for {url}")]
    NonNumericPrice { value: String, url: String },
}

/// Why an item was dropped. Counted, logged, never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("run was shut down")]
    RunClosed,

    #[error("required attribute '{0}' is empty")]
    MissingRequired(String),

    #[error("value '{value}' of '{attribute}' is not allowed")]
    NotAllowed { attribute: String, value: String },

    #[error("stock status could not be resolved from {0:?}")]
    UnresolvedStock(Vec<String>),

    #[error("price has no numeric token")]
    NoPrice,

    #[error("category path is empty")]
    EmptyCategory,

    #[error("item has no url")]
    MissingUrl,

    #[error("none of {0:?} is populated")]
    MissingKeyGroup(&'static [&'static str]),

    #[error("item is out of stock")]
    OutOfStock,

    #[error("item has a zero price")]
    ZeroPrice,

    #[error("remote id '{0}' was already seen in this run")]
    Duplicate(String),

    #[error("remote id is not a single text value")]
    InvalidRemoteId,
}

impl Rejection {
    /// Rejections produced while assembling the item count as `invalid`.
    pub fn is_assembly_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingRequired(_)
                | Self::NotAllowed { .. }
                | Self::UnresolvedStock(_)
                | Self::NoPrice
                | Self::EmptyCategory
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_messages_carry_status() {
        let err = RemoteError::http(503, "busy", "http://x");
        assert_eq!(err.to_string(), "HTTP request failed: 503 - busy");
    }

    #[test]
    fn assembly_failures_are_classified() {
        assert!(Rejection::NoPrice.is_assembly_failure());
        assert!(Rejection::MissingRequired("title".into()).is_assembly_failure());
        assert!(!Rejection::Duplicate("1".into()).is_assembly_failure());
        assert!(!Rejection::RunClosed.is_assembly_failure());
    }

    #[test]
    fn pipeline_error_wraps_config_error() {
        let err: PipelineError = ConfigError::MissingRemoteStoreUrl.into();
        assert_eq!(err.to_string(), "Remote store url is not configured");
    }
}
