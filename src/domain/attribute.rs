//! Declarative attribute configuration and its compiled form
//!
//! `AttributeConfig` is what a site file declares. `Attribute` is the
//! validated, ready-to-run version: regexes compiled, processor and inline
//! check resolved. Unknown processor or callback names fail deserialization,
//! so a bad site file never reaches a run.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Attributes stored as `<name>_<lang>` unless configured otherwise.
pub const LOCALIZED_ATTRIBUTES: &[&str] = &[
    "title",
    "price",
    "description",
    "category",
    "manufacturer",
    "specifications",
];

/// Validated but never stored on the item.
pub const UNSTORABLE_ATTRIBUTES: &[&str] = &["seller", "product_condition"];

/// Where to find a value in a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectorSpec {
    #[serde(default)]
    pub css: Option<String>,
    #[serde(default)]
    pub xpath: Option<String>,
    /// Applied to every selected string; first capture group when present.
    #[serde(default)]
    pub regex: Option<String>,
}

/// Named value processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    Price,
    Description,
    Category,
}

impl ProcessorKind {
    fn for_name(name: &str) -> Option<Self> {
        match name {
            "price" => Some(Self::Price),
            "description" => Some(Self::Description),
            "category" => Some(Self::Category),
            _ => None,
        }
    }
}

/// Reductions applied to raw selected values before the emptiness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackKind {
    FirstNonEmpty,
    Join,
    Unique,
}

/// One attribute as declared in a site file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeConfig {
    pub name: String,
    #[serde(default)]
    pub selector: SelectorSpec,
    #[serde(default)]
    pub sub_regex: Option<String>,
    #[serde(default)]
    pub sub_replacement: String,
    #[serde(default)]
    pub callback: Option<CallbackKind>,
    /// Overrides the processor implied by the attribute name.
    #[serde(default)]
    pub processor: Option<ProcessorKind>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub allowed_values: Vec<String>,
    #[serde(default)]
    pub meta_attribute: bool,
    #[serde(default)]
    pub localized: Option<bool>,
    #[serde(default)]
    pub instock_values: Vec<String>,
    #[serde(default)]
    pub outstock_values: Vec<String>,
    /// Named sub-selectors of a composite attribute.
    #[serde(default)]
    pub parts: Vec<AttributeConfig>,
}

impl AttributeConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn css(mut self, query: impl Into<String>) -> Self {
        self.selector.css = Some(query.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A compiled `css`/`xpath` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub css: Option<String>,
    pub xpath: Option<String>,
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.css, &self.xpath) {
            (Some(css), Some(xpath)) => write!(f, "css={css} xpath={xpath}"),
            (Some(css), None) => write!(f, "css={css}"),
            (None, Some(xpath)) => write!(f, "xpath={xpath}"),
            (None, None) => f.write_str("<none>"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Substitution {
    pub pattern: Regex,
    pub replacement: String,
}

/// Check applied right after processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineCheck {
    None,
    /// Lower-cased allowed values.
    AllowList(Vec<String>),
    Stock {
        instock: Vec<String>,
        outstock: Vec<String>,
    },
}

/// A validated attribute ready for extraction.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub query: Option<Query>,
    pub extract: Option<Regex>,
    pub substitution: Option<Substitution>,
    pub callback: Option<CallbackKind>,
    pub processor: Option<ProcessorKind>,
    pub check: InlineCheck,
    pub required: bool,
    pub default_value: Option<String>,
    pub meta_attribute: bool,
    pub localized: bool,
    pub storable: bool,
    pub parts: Vec<Attribute>,
}

impl Attribute {
    pub fn compile(config: &AttributeConfig) -> Result<Self, ConfigError> {
        let name = config.name.trim();
        if name.is_empty() {
            return Err(ConfigError::invalid_attribute("<unnamed>", "name is empty"));
        }

        let query = match (&config.selector.css, &config.selector.xpath) {
            (None, None) => None,
            (css, xpath) => Some(Query {
                css: css.clone(),
                xpath: xpath.clone(),
            }),
        };

        let extract = config
            .selector
            .regex
            .as_deref()
            .map(|pattern| Regex::new(pattern).map_err(|e| ConfigError::invalid_regex(name, &e)))
            .transpose()?;

        let substitution = config
            .sub_regex
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern)
                    .map(|pattern| Substitution {
                        pattern,
                        replacement: config.sub_replacement.clone(),
                    })
                    .map_err(|e| ConfigError::invalid_regex(name, &e))
            })
            .transpose()?;

        let check = match name {
            "seller" | "product_condition" => {
                if config.allowed_values.is_empty() {
                    return Err(ConfigError::invalid_attribute(
                        name,
                        "allow-listed attribute declares no allowed_values",
                    ));
                }
                InlineCheck::AllowList(
                    config
                        .allowed_values
                        .iter()
                        .map(|v| v.trim().to_lowercase())
                        .collect(),
                )
            }
            "stock_status" => {
                if config.instock_values.is_empty() && config.outstock_values.is_empty() {
                    return Err(ConfigError::invalid_attribute(
                        name,
                        "stock_status declares neither instock_values nor outstock_values",
                    ));
                }
                InlineCheck::Stock {
                    instock: config.instock_values.clone(),
                    outstock: config.outstock_values.clone(),
                }
            }
            _ => InlineCheck::None,
        };

        let parts = config
            .parts
            .iter()
            .map(Self::compile)
            .collect::<Result<Vec<_>, _>>()?;

        if query.is_none() && parts.is_empty() && !config.meta_attribute {
            return Err(ConfigError::invalid_attribute(
                name,
                "no selector, parts or meta_attribute configured",
            ));
        }

        Ok(Self {
            name: name.to_string(),
            query,
            extract,
            substitution,
            callback: config.callback,
            processor: config.processor.or_else(|| ProcessorKind::for_name(name)),
            check,
            required: config.required,
            default_value: config.default_value.clone(),
            meta_attribute: config.meta_attribute,
            localized: config
                .localized
                .unwrap_or_else(|| LOCALIZED_ATTRIBUTES.contains(&name)),
            storable: !UNSTORABLE_ATTRIBUTES.contains(&name),
            parts,
        })
    }

    pub fn is_composite(&self) -> bool {
        !self.parts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processor_is_implied_by_name() {
        let attr = Attribute::compile(&AttributeConfig::new("price_box").css(".p")).unwrap();
        assert_eq!(attr.processor, None);

        let attr = Attribute::compile(&AttributeConfig::new("price").css(".p")).unwrap();
        assert_eq!(attr.processor, Some(ProcessorKind::Price));
        assert!(attr.localized);
    }

    #[test]
    fn unknown_processor_fails_to_deserialize() {
        let raw = r#"{"name": "price", "selector": {"css": ".p"}, "processor": "currency"}"#;
        assert!(serde_json::from_str::<AttributeConfig>(raw).is_err());
    }

    #[test]
    fn bad_regex_is_a_config_error() {
        let mut config = AttributeConfig::new("title").css("h1");
        config.sub_regex = Some("(".into());
        assert!(matches!(
            Attribute::compile(&config),
            Err(ConfigError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn seller_needs_an_allow_list() {
        let config = AttributeConfig::new("seller").css(".seller");
        assert!(Attribute::compile(&config).is_err());

        let mut config = AttributeConfig::new("seller").css(".seller");
        config.allowed_values = vec!["Acme Store".into()];
        let attr = Attribute::compile(&config).unwrap();
        assert_eq!(attr.check, InlineCheck::AllowList(vec!["acme store".into()]));
        assert!(!attr.storable);
    }

    #[test]
    fn stock_status_needs_value_sets() {
        let config = AttributeConfig::new("stock_status").css(".stock");
        assert!(Attribute::compile(&config).is_err());
    }

    #[test]
    fn attribute_without_source_is_rejected() {
        assert!(Attribute::compile(&AttributeConfig::new("model")).is_err());

        let mut meta = AttributeConfig::new("category");
        meta.meta_attribute = true;
        assert!(Attribute::compile(&meta).is_ok());
    }
}
