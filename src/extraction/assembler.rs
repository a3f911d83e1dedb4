//! Item assembler
//!
//! Drives extraction, the transform chain and inline checks over a site's
//! attribute list, in declared order, producing one item or a [`Rejection`].
//! Rejections are values; counting them is the caller's job.

use tracing::{debug, error, warn};

use crate::domain::attribute::{Attribute, InlineCheck, ProcessorKind};
use crate::domain::item::{keys, AttrValue, Item};
use crate::domain::run_state::RunState;
use crate::domain::site::SiteSchema;
use crate::domain::value_objects::{Language, StockStatus};
use crate::error::Rejection;
use crate::extraction::document::Document;
use crate::extraction::{html, images, transform};

/// A product as delivered by the crawl source: the primary-language page and
/// optionally the same product in the secondary language.
pub struct ProductPage {
    pub primary: Box<dyn Document>,
    pub secondary: Option<Box<dyn Document>>,
}

impl ProductPage {
    pub fn new(primary: impl Document + 'static) -> Self {
        Self {
            primary: Box::new(primary),
            secondary: None,
        }
    }

    #[must_use]
    pub fn with_secondary(mut self, secondary: impl Document + 'static) -> Self {
        self.secondary = Some(Box::new(secondary));
        self
    }
}

// Never copied from the secondary page.
const PRIMARY_ONLY_KEYS: &[&str] = &[keys::STOCK_STATUS, keys::URL];

pub struct ItemAssembler<'a> {
    schema: &'a SiteSchema,
}

impl<'a> ItemAssembler<'a> {
    pub fn new(schema: &'a SiteSchema) -> Self {
        Self { schema }
    }

    /// Assemble both language variants of a page into one item.
    ///
    /// A rejected secondary page does not reject the product; the primary
    /// item is kept and the localization merger fills the gaps.
    pub fn assemble_page(&self, page: &ProductPage, run: &mut RunState) -> Result<Item, Rejection> {
        let mut item = self.assemble(page.primary.as_ref(), Language::En, &[], run)?;

        if let Some(secondary) = &page.secondary {
            match self.assemble(
                secondary.as_ref(),
                Language::Ar,
                &self.schema.secondary_ignore,
                run,
            ) {
                Ok(secondary_item) => merge_secondary(&mut item, secondary_item),
                Err(Rejection::RunClosed) => return Err(Rejection::RunClosed),
                Err(rejection) => warn!(
                    url = secondary.url(),
                    "Secondary page dropped: {rejection}"
                ),
            }
        }
        Ok(item)
    }

    pub fn assemble(
        &self,
        document: &dyn Document,
        language: Language,
        ignore: &[String],
        run: &mut RunState,
    ) -> Result<Item, Rejection> {
        if run.is_shut_down() {
            return Err(Rejection::RunClosed);
        }

        let url = self.resolve_url(document);
        let mut item = Item::new();

        for attribute in &self.schema.attributes {
            if ignore.iter().any(|name| name == &attribute.name)
                || (attribute.meta_attribute && !language.is_primary())
            {
                debug!(attribute = %attribute.name, "Attribute ignored for {language}");
                continue;
            }
            if let Err(rejection) = self.populate(&mut item, attribute, document, language) {
                warn!(url = %url, attribute = %attribute.name, "Item rejected: {rejection}");
                return Err(rejection);
            }
        }

        item.set(keys::URL, url.as_str());

        if language.is_primary()
            && !images::resolve(&mut item, self.schema.relative_images, &self.schema.base_urls)
        {
            error!(url = %url, "Could not populate images");
            run.counters.missing_images += 1;
            run.record_error();
        }
        Ok(item)
    }

    fn populate(
        &self,
        item: &mut Item,
        attribute: &Attribute,
        document: &dyn Document,
        language: Language,
    ) -> Result<(), Rejection> {
        let mut value = if attribute.meta_attribute {
            let key = format!("referer_{}", attribute.name);
            AttrValue::List(document.meta(&key).map(<[String]>::to_vec).unwrap_or_default())
        } else {
            extract(attribute, document)
        };

        if value.is_empty() {
            if !attribute.required {
                debug!(attribute = %attribute.name, "No value, skipping");
                return Ok(());
            }
            let out_of_stock = item.text(keys::STOCK_STATUS) == Some(StockStatus::OutOfStock.as_str());
            match (&attribute.default_value, out_of_stock) {
                (Some(default), true) => value = AttrValue::scalar(default.as_str()),
                _ => return Err(Rejection::MissingRequired(attribute.name.clone())),
            }
        }

        let value = transform::substitute(value, attribute);
        let unprocessed = value.clone();
        let value = match attribute.processor {
            Some(ProcessorKind::Price) => AttrValue::Scalar(transform::process_price(&value.texts())?),
            Some(ProcessorKind::Description) => {
                AttrValue::Scalar(transform::process_description(&value.texts()))
            }
            Some(ProcessorKind::Category) => AttrValue::Scalar(transform::process_category(
                &value.texts(),
                self.schema.category_max_level,
            )?),
            None => value,
        };

        let value = match &attribute.check {
            InlineCheck::None => value,
            InlineCheck::AllowList(allowed) => {
                let candidate = value.first().unwrap_or_default().trim().to_lowercase();
                if !allowed.contains(&candidate) {
                    return Err(Rejection::NotAllowed {
                        attribute: attribute.name.clone(),
                        value: candidate,
                    });
                }
                value
            }
            InlineCheck::Stock { instock, outstock } => {
                let texts = value.texts();
                match transform::resolve_stock(&texts, instock, outstock) {
                    Some(status) => AttrValue::scalar(status.as_str()),
                    None => return Err(Rejection::UnresolvedStock(texts)),
                }
            }
        };

        if !attribute.storable {
            return Ok(());
        }

        let value = transform::cleanup(value);
        if value.is_empty() {
            warn!(attribute = %attribute.name, "Value is empty after processing, not stored");
            return Ok(());
        }

        if attribute.localized {
            let suffix = language.suffix();
            match attribute.processor {
                Some(ProcessorKind::Description) => {
                    if let Some(fragment) = unprocessed.first() {
                        item.set(format!("description_html{suffix}"), html::sanitize(fragment));
                    }
                }
                Some(ProcessorKind::Category) => {
                    let full_path = transform::process_category(&unprocessed.texts(), None)?;
                    item.set(format!("complete_category{suffix}"), full_path);
                }
                _ => {}
            }
            item.set(format!("{}{suffix}", attribute.name), value);
        } else {
            item.set(attribute.name.as_str(), value);
        }
        Ok(())
    }

    fn resolve_url(&self, document: &dyn Document) -> String {
        self.schema
            .url_attribute
            .as_ref()
            .and_then(|attribute| extract(attribute, document).populated_texts().into_iter().next())
            .map(|url| url.trim().to_string())
            .unwrap_or_else(|| document.url().to_string())
    }
}

/// Raw value for an attribute; composite attributes yield one pair per part.
fn extract(attribute: &Attribute, document: &dyn Document) -> AttrValue {
    if attribute.is_composite() {
        return AttrValue::Pairs(
            attribute
                .parts
                .iter()
                .map(|part| (part.name.clone(), extract(part, document)))
                .collect(),
        );
    }

    let Some(query) = &attribute.query else {
        return AttrValue::empty();
    };
    let selected = match document.select(query) {
        Ok(selected) => selected,
        Err(e) => {
            warn!(attribute = %attribute.name, "Selector evaluation failed: {e}");
            return AttrValue::empty();
        }
    };

    let selected = match &attribute.extract {
        Some(pattern) => selected
            .iter()
            .flat_map(|text| {
                pattern.captures_iter(text).filter_map(|caps| {
                    caps.get(1)
                        .or_else(|| caps.get(0))
                        .map(|m| m.as_str().to_string())
                })
            })
            .collect(),
        None => selected,
    };

    let value = AttrValue::List(selected);
    match attribute.callback {
        Some(callback) => transform::apply_callback(value, callback),
        None => value,
    }
}

/// Copy populated secondary values over the primary item.
fn merge_secondary(primary: &mut Item, secondary: Item) {
    for (key, value) in secondary.iter() {
        if value.is_empty() || PRIMARY_ONLY_KEYS.contains(&key.as_str()) {
            continue;
        }
        primary.set(key.clone(), value.clone());
    }
}
