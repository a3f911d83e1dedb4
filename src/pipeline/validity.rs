//! Validity gate
//!
//! Structural completeness, stock state and price checks. Updates the run
//! counters as it goes. A price that is not a number at this point means the
//! site configuration is broken, so it aborts the run instead of rejecting.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::item::{keys, Item};
use crate::domain::run_state::RunState;
use crate::domain::services::RemoteStore;
use crate::domain::value_objects::StockStatus;
use crate::error::{PipelineError, Rejection};

/// Each group needs at least one populated member.
pub const REQUIRED_KEY_GROUPS: &[&[&str]] = &[
    &["title_en", "title_ar"],
    &["price_en", "price_ar"],
    &["main_image", "extra_images"],
    &["stock_status"],
    &["remote_id"],
    &["category_en", "category_ar"],
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(Rejection),
}

pub struct ValidityGate {
    store: Arc<dyn RemoteStore>,
    delete_out_of_stock: bool,
}

impl ValidityGate {
    pub fn new(store: Arc<dyn RemoteStore>, delete_out_of_stock: bool) -> Self {
        Self {
            store,
            delete_out_of_stock,
        }
    }

    pub async fn check(&self, item: &Item, run: &mut RunState) -> Result<Verdict, PipelineError> {
        let url = item.text(keys::URL).unwrap_or_default().to_string();
        if url.trim().is_empty() {
            error!("Item without url reached validation");
            run.record_error();
            return Ok(Verdict::Reject(Rejection::MissingUrl));
        }

        if let Some(group) = missing_key_group(item) {
            error!(url = %url, "Item is missing all of {group:?}");
            run.record_error();
            return Ok(Verdict::Reject(Rejection::MissingKeyGroup(group)));
        }

        if item.text(keys::STOCK_STATUS) != Some(StockStatus::InStock.as_str()) {
            run.counters.out_of_stock += 1;
            let remote_id = item.text(keys::REMOTE_ID).unwrap_or_default();
            warn!(url = %url, "Product {remote_id} is not in stock");
            if self.delete_out_of_stock {
                info!("Deleting out of stock product {remote_id}");
                if let Err(e) = self
                    .store
                    .delete_out_of_stock(&run.merchant_key, remote_id)
                    .await
                {
                    error!("Can't delete out of stock product {remote_id}: {e}");
                    run.record_error();
                }
            }
            return Ok(Verdict::Reject(Rejection::OutOfStock));
        }

        run.counters.in_stock += 1;
        if item.is_populated("manufacturer_en") {
            run.counters.manufacturer_populated += 1;
        } else {
            run.counters.manufacturer_empty += 1;
        }

        let price_key = if item.is_populated("price_en") {
            "price_en"
        } else {
            "price_ar"
        };
        let raw_price = item.text(price_key).unwrap_or_default().trim().to_string();
        let price: f64 = raw_price
            .parse()
            .map_err(|_| PipelineError::NonNumericPrice {
                value: raw_price.clone(),
                url: url.clone(),
            })?;
        if price == 0.0 {
            run.counters.zero_price += 1;
            warn!(url = %url, "Product {} has 0 price", item.text(keys::REMOTE_ID).unwrap_or_default());
            return Ok(Verdict::Reject(Rejection::ZeroPrice));
        }

        if item.is_populated(keys::MODEL) {
            run.counters.model_populated += 1;
        }
        Ok(Verdict::Accept)
    }
}

pub fn missing_key_group(item: &Item) -> Option<&'static [&'static str]> {
    REQUIRED_KEY_GROUPS
        .iter()
        .copied()
        .find(|group| !group.iter().any(|key| item.is_populated(key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::site::SiteSchema;
    use crate::domain::value_objects::JobId;
    use crate::test_utils::InMemoryRemoteStore;

    fn valid_item() -> Item {
        let mut item = Item::new();
        item.set("url", "http://x.com/p/1");
        item.set("title_en", "Phone");
        item.set("price_ar", "99.5");
        item.set("main_image", "http://x.com/a.jpg");
        item.set("stock_status", "IN_STOCK");
        item.set("remote_id", "1");
        item.set("category_en", "phones");
        item
    }

    fn run() -> RunState {
        let schema =
            SiteSchema::from_json_str(r#"{"merchant_name": "acme", "attributes": []}"#).unwrap();
        RunState::new(&schema, JobId::new("job"))
    }

    #[tokio::test]
    async fn accepts_complete_in_stock_item() {
        let gate = ValidityGate::new(Arc::new(InMemoryRemoteStore::default()), false);
        let mut run = run();
        let mut item = valid_item();
        item.set("model", "X1");

        assert_eq!(gate.check(&item, &mut run).await.unwrap(), Verdict::Accept);
        assert_eq!(run.counters.in_stock, 1);
        assert_eq!(run.counters.manufacturer_empty, 1);
        assert_eq!(run.counters.model_populated, 1);
    }

    #[tokio::test]
    async fn rejects_item_missing_key_group() {
        let gate = ValidityGate::new(Arc::new(InMemoryRemoteStore::default()), false);
        let mut run = run();
        let mut item = valid_item();
        item.remove("category_en");
        item.set("category_ar", "");

        assert_eq!(
            gate.check(&item, &mut run).await.unwrap(),
            Verdict::Reject(Rejection::MissingKeyGroup(&["category_en", "category_ar"]))
        );
    }

    #[tokio::test]
    async fn out_of_stock_is_deleted_remotely_when_enabled() {
        let store = Arc::new(InMemoryRemoteStore::default());
        let gate = ValidityGate::new(store.clone(), true);
        let mut run = run();
        let mut item = valid_item();
        item.set("stock_status", "OUT_OF_STOCK");

        assert_eq!(
            gate.check(&item, &mut run).await.unwrap(),
            Verdict::Reject(Rejection::OutOfStock)
        );
        assert_eq!(run.counters.out_of_stock, 1);
        assert_eq!(store.deleted_out_of_stock(), vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn zero_price_is_rejected_and_counted() {
        let gate = ValidityGate::new(Arc::new(InMemoryRemoteStore::default()), false);
        let mut run = run();
        let mut item = valid_item();
        item.set("price_en", "0.0");

        assert_eq!(
            gate.check(&item, &mut run).await.unwrap(),
            Verdict::Reject(Rejection::ZeroPrice)
        );
        assert_eq!(run.counters.zero_price, 1);
    }

    #[tokio::test]
    async fn non_numeric_price_is_fatal() {
        let gate = ValidityGate::new(Arc::new(InMemoryRemoteStore::default()), false);
        let mut run = run();
        let mut item = valid_item();
        item.set("price_en", "ten");

        assert!(matches!(
            gate.check(&item, &mut run).await,
            Err(PipelineError::NonNumericPrice { .. })
        ));
    }
}
