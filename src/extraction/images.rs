//! Image set resolution
//!
//! Consolidates `main_image` / `extra_images` into absolute references and the
//! deduplicated `image_urls` download set.

use tracing::warn;
use url::Url;

use crate::domain::item::{keys, AttrValue, Item};

fn join(base: Option<&Url>, reference: &str) -> String {
    match base.map(|base| base.join(reference)) {
        Some(Ok(joined)) => joined.to_string(),
        Some(Err(e)) => {
            warn!("Cannot resolve image '{reference}': {e}");
            reference.to_string()
        }
        None => reference.to_string(),
    }
}

/// Returns `false` when the item ends up with nothing to download.
///
/// A multi-valued `main_image` keeps its first element; the rest are moved to
/// the front of `extra_images`.
pub fn resolve(item: &mut Item, relative: bool, base_urls: &[String]) -> bool {
    let mut main = item
        .get(keys::MAIN_IMAGE)
        .map(AttrValue::populated_texts)
        .unwrap_or_default();
    let mut extra = item
        .get(keys::EXTRA_IMAGES)
        .map(AttrValue::populated_texts)
        .unwrap_or_default();

    if main.len() > 1 {
        warn!(
            url = item.text(keys::URL).unwrap_or_default(),
            "main_image has {} values, keeping the first",
            main.len()
        );
        let rest = main.split_off(1);
        extra.splice(0..0, rest);
    }
    if main.is_empty() && !extra.is_empty() {
        main.push(extra.remove(0));
    }

    if relative {
        let base = base_urls.first().and_then(|b| Url::parse(b).ok());
        main = main.iter().map(|m| join(base.as_ref(), m)).collect();
        extra = extra.iter().map(|e| join(base.as_ref(), e)).collect();
    }

    let mut download: Vec<String> = Vec::with_capacity(main.len() + extra.len());
    for image in main.iter().chain(extra.iter()) {
        let is_base = base_urls
            .iter()
            .any(|b| b == image || b.trim_end_matches('/') == image.trim_end_matches('/'));
        if !is_base && !download.contains(image) {
            download.push(image.clone());
        }
    }

    if let Some(first) = main.into_iter().next() {
        item.set(keys::MAIN_IMAGE, first);
    }
    if item.contains(keys::EXTRA_IMAGES) || !extra.is_empty() {
        item.set(keys::EXTRA_IMAGES, AttrValue::List(extra));
    }

    let found = !download.is_empty();
    item.set(keys::IMAGE_URLS, AttrValue::List(download));
    found
}
