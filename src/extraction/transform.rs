//! Value transform chain: substitution, callbacks, processors, cleanup

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::domain::attribute::{Attribute, CallbackKind, Substitution};
use crate::domain::item::AttrValue;
use crate::domain::value_objects::StockStatus;
use crate::error::Rejection;
use crate::extraction::html;

/// Separator between category levels.
pub const CATEGORY_DELIMITER: &str = "\\";

static LETTERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z]").expect("valid regex"));
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid regex"));

pub fn apply_callback(value: AttrValue, callback: CallbackKind) -> AttrValue {
    let AttrValue::List(values) = value else {
        return value;
    };
    match callback {
        CallbackKind::FirstNonEmpty => values
            .into_iter()
            .find(|v| !v.trim().is_empty())
            .map_or_else(AttrValue::empty, AttrValue::Scalar),
        CallbackKind::Join => AttrValue::Scalar(
            values
                .iter()
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        ),
        CallbackKind::Unique => {
            let mut unique: Vec<String> = Vec::with_capacity(values.len());
            for v in values {
                if !unique.contains(&v) {
                    unique.push(v);
                }
            }
            AttrValue::List(unique)
        }
    }
}

fn substitute_text(value: &str, substitution: &Substitution) -> String {
    substitution
        .pattern
        .replace_all(value, substitution.replacement.as_str())
        .into_owned()
}

/// Regex substitution. List elements are trimmed before and after.
pub fn substitute(value: AttrValue, attribute: &Attribute) -> AttrValue {
    match value {
        AttrValue::Pairs(pairs) => AttrValue::Pairs(
            pairs
                .into_iter()
                .map(|(name, value)| {
                    let value = match attribute.parts.iter().find(|p| p.name == name) {
                        Some(part) => substitute(value, part),
                        None => value,
                    };
                    (name, value)
                })
                .collect(),
        ),
        AttrValue::List(values) => match &attribute.substitution {
            Some(sub) => AttrValue::List(
                values
                    .iter()
                    .map(|v| substitute_text(v.trim(), sub).trim().to_string())
                    .collect(),
            ),
            None => AttrValue::List(values),
        },
        AttrValue::Scalar(value) => match &attribute.substitution {
            Some(sub) => AttrValue::Scalar(substitute_text(&value, sub)),
            None => AttrValue::Scalar(value),
        },
    }
}

/// Minimum numeric price among tokens that carry no letters.
///
/// Thousands separators are dropped and the numeric part of each token is
/// kept, so `"$12,000"` reads as `12000`. The winning token's text is returned.
pub fn process_price(values: &[String]) -> Result<String, Rejection> {
    values
        .iter()
        .filter(|v| !v.trim().is_empty() && !LETTERS.is_match(v))
        .filter_map(|v| {
            let cleaned = v.replace(',', "");
            let token = NUMBER.find(&cleaned)?.as_str().to_string();
            let number = token.parse::<f64>().ok()?;
            Some((number, token))
        })
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, token)| token)
        .ok_or(Rejection::NoPrice)
}

/// Plain text of the first description fragment.
pub fn process_description(values: &[String]) -> String {
    if values.len() > 1 {
        warn!("Description has {} elements, using the first", values.len());
    }
    values.first().map(|v| html::plain_text(v)).unwrap_or_default()
}

/// Lower-cased category path, truncated to `max_level` levels.
pub fn process_category(values: &[String], max_level: Option<usize>) -> Result<String, Rejection> {
    let levels = values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty());
    let levels: Vec<String> = match max_level {
        Some(max) => levels.take(max).collect(),
        None => levels.collect(),
    };
    if levels.is_empty() {
        return Err(Rejection::EmptyCategory);
    }
    Ok(levels.join(CATEGORY_DELIMITER))
}

/// Exact (trimmed) match against the configured value sets; in-stock wins.
pub fn resolve_stock(values: &[String], instock: &[String], outstock: &[String]) -> Option<StockStatus> {
    let matches = |set: &[String]| {
        values
            .iter()
            .any(|v| set.iter().any(|candidate| candidate.trim() == v.trim()))
    };
    if matches(instock) {
        Some(StockStatus::InStock)
    } else if matches(outstock) {
        Some(StockStatus::OutOfStock)
    } else {
        None
    }
}

/// Collapse single-element lists, trim text, drop empty pairs.
pub fn cleanup(value: AttrValue) -> AttrValue {
    match value {
        AttrValue::Scalar(s) => AttrValue::Scalar(s.trim().to_string()),
        AttrValue::List(mut values) if values.len() == 1 => {
            AttrValue::Scalar(values.remove(0).trim().to_string())
        }
        AttrValue::List(values) => AttrValue::List(values),
        AttrValue::Pairs(pairs) => AttrValue::Pairs(
            pairs
                .into_iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(name, v)| (name, cleanup(v)))
                .collect(),
        ),
    }
}
