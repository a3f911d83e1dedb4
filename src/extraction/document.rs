//! Document abstraction and the bundled `scraper`-backed implementation
//!
//! CSS queries accept two pseudo-element suffixes:
//! - `::text` selects the direct text children of each match
//! - `::attr(name)` selects the named attribute of each match
//!
//! Without a suffix each match yields its outer HTML.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::attribute::Query;
use crate::error::DocumentError;

/// A fetched page the pipeline can query.
pub trait Document: Send + Sync {
    fn url(&self) -> &str;

    fn select(&self, query: &Query) -> Result<Vec<String>, DocumentError>;

    fn raw_body(&self) -> &[u8];

    /// Values the crawl source carried along with the page.
    fn meta(&self, key: &str) -> Option<&[String]>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Projection {
    OuterHtml,
    Text,
    Attr(String),
}

fn split_projection(query: &str) -> (&str, Projection) {
    if let Some(css) = query.strip_suffix("::text") {
        return (css, Projection::Text);
    }
    if let Some(start) = query.rfind("::attr(") {
        if let Some(name) = query[start + 7..].strip_suffix(')') {
            return (&query[..start], Projection::Attr(name.trim().to_string()));
        }
    }
    (query, Projection::OuterHtml)
}

fn project(element: ElementRef<'_>, projection: &Projection, out: &mut Vec<String>) {
    match projection {
        Projection::OuterHtml => out.push(element.html()),
        Projection::Text => out.extend(
            element
                .children()
                .filter_map(|node| node.value().as_text().map(|text| text.to_string())),
        ),
        Projection::Attr(name) => {
            if let Some(value) = element.value().attr(name) {
                out.push(value.to_string());
            }
        }
    }
}

/// HTML page parsed on demand with `scraper`.
///
/// The parsed tree is not `Send`, so each query parses the body again.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HtmlDocument {
    pub url: String,
    pub body: String,
    #[serde(default)]
    pub meta: HashMap<String, Vec<String>>,
}

impl HtmlDocument {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
            meta: HashMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.meta.insert(key.into(), values);
        self
    }

    fn select_css(&self, query: &str) -> Result<Vec<String>, DocumentError> {
        let (css, projection) = split_projection(query.trim());
        let css = if css.trim().is_empty() { ":root" } else { css };
        let selector = Selector::parse(css).map_err(|e| DocumentError::InvalidSelector {
            selector: query.to_string(),
            reason: format!("{e:?}"),
        })?;

        let html = Html::parse_document(&self.body);
        let mut values = Vec::new();
        for element in html.select(&selector) {
            project(element, &projection, &mut values);
        }
        Ok(values)
    }
}

impl Document for HtmlDocument {
    fn url(&self) -> &str {
        &self.url
    }

    fn select(&self, query: &Query) -> Result<Vec<String>, DocumentError> {
        if let Some(xpath) = &query.xpath {
            return Err(DocumentError::UnsupportedQuery {
                query: xpath.clone(),
                reason: "xpath is not supported by HtmlDocument".into(),
            });
        }
        match &query.css {
            Some(css) => self.select_css(css),
            None => Ok(Vec::new()),
        }
    }

    fn raw_body(&self) -> &[u8] {
        self.body.as_bytes()
    }

    fn meta(&self, key: &str) -> Option<&[String]> {
        self.meta.get(key).map(Vec::as_slice)
    }
}
