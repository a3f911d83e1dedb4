//! Normalized product record and its attribute values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known item keys.
pub mod keys {
    pub const URL: &str = "url";
    pub const REMOTE_ID: &str = "remote_id";
    pub const STOCK_STATUS: &str = "stock_status";
    pub const MAIN_IMAGE: &str = "main_image";
    pub const EXTRA_IMAGES: &str = "extra_images";
    pub const IMAGE_URLS: &str = "image_urls";
    pub const MODEL: &str = "model";
    pub const MERCHANT_NAME: &str = "merchant_name";
    pub const JOB_ID: &str = "job_id";
}

/// A single attribute value.
///
/// Composite attributes produce `Pairs`: one `(part name, value)` entry per
/// configured part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Scalar(String),
    List(Vec<String>),
    Pairs(Vec<(String, AttrValue)>),
}

impl AttrValue {
    pub fn scalar(value: impl Into<String>) -> Self {
        Self::Scalar(value.into())
    }

    pub fn empty() -> Self {
        Self::List(Vec::new())
    }

    /// No element carries text.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Scalar(s) => s.trim().is_empty(),
            Self::List(values) => values.iter().all(|v| v.trim().is_empty()),
            Self::Pairs(pairs) => pairs.iter().all(|(_, v)| v.is_empty()),
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// First textual element, for scalars the value itself.
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s.as_str()),
            Self::List(values) => values.first().map(String::as_str),
            Self::Pairs(_) => None,
        }
    }

    /// Textual elements. Pairs have none.
    pub fn texts(&self) -> Vec<String> {
        match self {
            Self::Scalar(s) => vec![s.clone()],
            Self::List(values) => values.clone(),
            Self::Pairs(_) => Vec::new(),
        }
    }

    /// Non-blank textual elements.
    pub fn populated_texts(&self) -> Vec<String> {
        self.texts()
            .into_iter()
            .filter(|v| !v.trim().is_empty())
            .collect()
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

/// One normalized product record keyed by attribute name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item {
    attributes: BTreeMap<String, AttrValue>,
}

impl Item {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.attributes.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Present and carrying text.
    pub fn is_populated(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.is_empty())
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(AttrValue::first)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.attributes.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl FromIterator<(String, AttrValue)> for Item {
    fn from_iter<T: IntoIterator<Item = (String, AttrValue)>>(iter: T) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}
