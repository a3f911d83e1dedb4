//! JSON-lines page feeds
//!
//! One product per line: `{"url", "body", "meta"?, "secondary"?}` where
//! `secondary` has the same shape (without its own `secondary`).

use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tracing::warn;

use crate::error::RemoteError;
use crate::extraction::assembler::ProductPage;
use crate::extraction::document::HtmlDocument;

#[derive(Debug, Clone, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub body: String,
    #[serde(default)]
    pub meta: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub secondary: Option<HtmlDocument>,
}

impl PageRecord {
    pub fn into_page(self) -> ProductPage {
        let primary = HtmlDocument {
            url: self.url,
            body: self.body,
            meta: self.meta,
        };
        let page = ProductPage::new(primary);
        match self.secondary {
            Some(secondary) => page.with_secondary(secondary),
            None => page,
        }
    }
}

/// Parses one feed line; blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<Result<PageRecord, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Streams the pages of a feed file. Lines that do not parse are logged and
/// skipped.
pub async fn read_pages(path: &Path) -> Result<impl Stream<Item = ProductPage>, RemoteError> {
    let file = File::open(path).await.map_err(|e| RemoteError::storage(&e))?;
    let source = path.display().to_string();

    let lines = LinesStream::new(BufReader::new(file).lines());
    Ok(lines.enumerate().filter_map(move |(index, line)| {
        let page = match line {
            Ok(line) => match parse_line(&line) {
                Some(Ok(record)) => Some(record.into_page()),
                Some(Err(e)) => {
                    warn!("{source}:{}: skipping unreadable page: {e}", index + 1);
                    None
                }
                None => None,
            },
            Err(e) => {
                warn!("{source}:{}: read error: {e}", index + 1);
                None
            }
        };
        futures::future::ready(page)
    }))
}
