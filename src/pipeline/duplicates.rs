//! Per-run duplicate filter keyed on `remote_id`

use std::collections::HashSet;
use tracing::{debug, error};

use crate::domain::item::{keys, AttrValue, Item};
use crate::error::Rejection;

#[derive(Debug, Default)]
pub struct DuplicateFilter {
    seen: HashSet<String>,
}

impl DuplicateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `id`; `true` if it was already recorded.
    pub fn seen(&mut self, id: &str) -> bool {
        !self.seen.insert(id.to_string())
    }

    /// The id must be a single text value. Anything else is a data-integrity
    /// defect, reported separately from duplicates.
    pub fn check(&mut self, item: &Item) -> Result<(), Rejection> {
        let url = item.text(keys::URL).unwrap_or_default();
        let value = item.get(keys::REMOTE_ID);
        let Some(id) = value
            .and_then(AttrValue::as_scalar)
            .map(str::trim)
            .filter(|id| !id.is_empty())
        else {
            error!(url, "Item remote id is not a single text value: {value:?}");
            return Err(Rejection::InvalidRemoteId);
        };
        if self.seen(id) {
            debug!(url, "Item with remote id {id} is a duplicate");
            return Err(Rejection::Duplicate(id.to_string()));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
