//! Per-site configuration
//!
//! A site file is JSON. It is compiled once into a [`SiteSchema`] and shared
//! read-only by the whole run.

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::domain::attribute::{Attribute, AttributeConfig};
use crate::error::ConfigError;

/// Site file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    pub merchant_name: String,
    /// Remote store key; falls back to `merchant_name`.
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub country: String,
    /// Merchant base urls. The first one resolves relative image paths.
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub relative_images: bool,
    #[serde(default)]
    pub category_max_level: Option<usize>,
    /// Overrides the process-wide deletion threshold (percent).
    #[serde(default)]
    pub deletion_threshold: Option<f64>,
    #[serde(default)]
    pub delete_out_of_stock: bool,
    /// Attributes skipped when assembling the secondary-language page.
    #[serde(default)]
    pub secondary_ignore: Vec<String>,
    pub attributes: Vec<AttributeConfig>,
}

/// Compiled site configuration.
#[derive(Debug, Clone)]
pub struct SiteSchema {
    pub merchant_name: String,
    pub merchant_key: String,
    pub country: String,
    pub base_urls: Vec<String>,
    pub relative_images: bool,
    pub category_max_level: Option<usize>,
    pub deletion_threshold: Option<f64>,
    pub delete_out_of_stock: bool,
    pub secondary_ignore: Vec<String>,
    /// Declared order, excluding `url`.
    pub attributes: Vec<Attribute>,
    pub url_attribute: Option<Attribute>,
}

impl SiteSchema {
    pub fn compile(config: SiteConfig) -> Result<Self, ConfigError> {
        let merchant_name = config.merchant_name.trim().to_string();
        if merchant_name.is_empty() {
            return Err(ConfigError::invalid_value("merchant_name", "must not be empty"));
        }

        for base in &config.urls {
            Url::parse(base).map_err(|e| ConfigError::InvalidUrl {
                url: base.clone(),
                reason: e.to_string(),
            })?;
        }
        if config.relative_images && config.urls.is_empty() {
            return Err(ConfigError::invalid_value(
                "urls",
                "relative_images requires at least one base url",
            ));
        }

        if let Some(threshold) = config.deletion_threshold {
            if !(0.0..=100.0).contains(&threshold) {
                return Err(ConfigError::invalid_value(
                    "deletion_threshold",
                    format!("{threshold} is not a percentage"),
                ));
            }
        }

        if config.category_max_level == Some(0) {
            return Err(ConfigError::invalid_value(
                "category_max_level",
                "must be at least 1",
            ));
        }

        let mut attributes = Vec::with_capacity(config.attributes.len());
        let mut url_attribute = None;
        for attr in &config.attributes {
            let compiled = Attribute::compile(attr)?;
            if compiled.name == "url" {
                url_attribute = Some(compiled);
            } else {
                attributes.push(compiled);
            }
        }

        let merchant_key = config
            .merchant_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| merchant_name.clone());

        Ok(Self {
            merchant_name,
            merchant_key,
            country: config.country,
            base_urls: config.urls,
            relative_images: config.relative_images,
            category_max_level: config.category_max_level,
            deletion_threshold: config.deletion_threshold,
            delete_out_of_stock: config.delete_out_of_stock,
            secondary_ignore: config.secondary_ignore,
            attributes,
            url_attribute,
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: SiteConfig = serde_json::from_str(raw).map_err(|e| ConfigError::Load {
            source_name: "site config".into(),
            reason: e.to_string(),
        })?;
        Self::compile(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
            source_name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: SiteConfig = serde_json::from_str(&raw).map_err(|e| ConfigError::Load {
            source_name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::compile(config)
    }

    /// `<COUNTRY>-<merchant>` prefix used in alerts.
    pub fn alert_label(&self) -> String {
        format!("{}-{}", self.country.to_uppercase(), self.merchant_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = r##"{
        "merchant_name": "acme",
        "country": "eg",
        "urls": ["http://acme.example"],
        "attributes": [
            {"name": "url", "selector": {"css": "link[rel=canonical]::attr(href)"}},
            {"name": "title", "selector": {"css": "h1::text"}, "required": true},
            {"name": "remote_id", "selector": {"css": "#sku::text"}}
        ]
    }"##;

    #[test]
    fn url_attribute_is_split_out() {
        let schema = SiteSchema::from_json_str(SITE).unwrap();
        assert!(schema.url_attribute.is_some());
        let names: Vec<_> = schema.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["title", "remote_id"]);
        assert_eq!(schema.merchant_key, "acme");
        assert_eq!(schema.alert_label(), "EG-acme");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = r#"{"merchant_name": "acme", "attributes": [], "color": "red"}"#;
        assert!(matches!(
            SiteSchema::from_json_str(raw),
            Err(ConfigError::Load { .. })
        ));
    }

    #[test]
    fn relative_images_need_a_base_url() {
        let raw = r#"{"merchant_name": "acme", "relative_images": true, "attributes": []}"#;
        assert!(SiteSchema::from_json_str(raw).is_err());
    }

    #[test]
    fn threshold_must_be_a_percentage() {
        let raw = r#"{"merchant_name": "acme", "deletion_threshold": 140, "attributes": []}"#;
        assert!(SiteSchema::from_json_str(raw).is_err());
    }
}
