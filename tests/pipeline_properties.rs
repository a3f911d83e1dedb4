//! Behavioral properties of the individual pipeline stages
use std::sync::Arc;

use proptest::prelude::*;
use rstest::rstest;

use product_ingest::domain::item::{AttrValue, Item};
use product_ingest::domain::run_state::RunState;
use product_ingest::domain::site::SiteSchema;
use product_ingest::domain::value_objects::JobId;
use product_ingest::error::Rejection;
use product_ingest::extraction::{images, localization, transform};
use product_ingest::pipeline::{DuplicateFilter, PersistenceSink, SinkConfig};
use product_ingest::test_utils::RecordingBackend;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

fn item_with_id(id: &str) -> Item {
    let mut item = Item::new();
    item.set("url", format!("http://x.com/p/{id}"));
    item.set("remote_id", id);
    item
}

#[rstest]
#[case(&["$12,000", "abc", "9.50"], Some("9.50"))]
#[case(&["1,299.00"], Some("1299.00"))]
#[case(&["EGP 100", "USD 5"], None)]
#[case(&["", "  "], None)]
#[case(&["30", "20.5", "25"], Some("20.5"))]
fn price_keeps_minimum_numeric_token(#[case] input: &[&str], #[case] expected: Option<&str>) {
    let result = transform::process_price(&strings(input));
    match expected {
        Some(price) => assert_eq!(result.as_deref(), Ok(price)),
        None => assert_eq!(result, Err(Rejection::NoPrice)),
    }
}

#[test]
fn duplicate_filter_rejects_only_the_repeat() {
    let mut filter = DuplicateFilter::new();
    let results: Vec<_> = ["A", "B", "A"]
        .iter()
        .map(|id| filter.check(&item_with_id(id)))
        .collect();

    assert_eq!(
        results,
        vec![Ok(()), Ok(()), Err(Rejection::Duplicate("A".into()))]
    );
}

proptest! {
    #[test]
    fn duplicate_rejections_equal_repeats(ids in prop::collection::vec("[a-d]", 0..30)) {
        let mut filter = DuplicateFilter::new();
        let rejected = ids
            .iter()
            .filter(|id| filter.check(&item_with_id(id)).is_err())
            .count();
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        prop_assert_eq!(rejected, ids.len() - unique.len());
    }

    #[test]
    fn localization_merge_is_idempotent(
        title_en in "[a-z ]{0,6}",
        title_ar in "[a-z ]{0,6}",
        with_price in any::<bool>(),
    ) {
        let mut item = Item::new();
        item.set("title_en", title_en);
        item.set("title_ar", title_ar);
        if with_price {
            item.set("price_en", "10");
        }

        let mut once = item.clone();
        localization::merge(&mut once);
        let mut twice = once.clone();
        localization::merge(&mut twice);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn unknown_stock_text_never_resolves(text in "[a-z]{1,10}") {
        let instock = strings(&["In stock"]);
        let outstock = strings(&["Sold out"]);
        prop_assert_eq!(transform::resolve_stock(&[text], &instock, &outstock), None);
    }
}

#[tokio::test]
async fn sink_buffer_of_three_flushes_in_batches() {
    let schema = SiteSchema::from_json_str(r#"{"merchant_name": "acme", "attributes": []}"#).unwrap();
    let mut run = RunState::new(&schema, JobId::new("job-1"));
    let backend = Arc::new(RecordingBackend::default());
    let config = SinkConfig {
        collection: "items".into(),
        buffer_size: Some(3),
        ..SinkConfig::default()
    };
    let mut sink = PersistenceSink::new(config, backend.clone(), "acme", "job-1").unwrap();

    sink.submit(item_with_id("1"), &mut run).await;
    sink.submit(item_with_id("2"), &mut run).await;
    assert!(backend.batches().is_empty());

    sink.submit(item_with_id("3"), &mut run).await;
    assert_eq!(backend.batch_ids(), vec![vec!["1", "2", "3"]]);

    sink.submit(item_with_id("4"), &mut run).await;
    assert_eq!(backend.batches().len(), 1);

    sink.shutdown(&mut run).await;
    assert_eq!(backend.batch_ids(), vec![vec!["1", "2", "3"], vec!["4"]]);
    assert_eq!(sink.batches_sent(), 2);
}

#[test]
fn relative_extra_images_fill_main_image() {
    let mut item = Item::new();
    item.set("main_image", AttrValue::List(Vec::new()));
    item.set("extra_images", strings(&["/a.jpg", "/b.jpg"]));

    let found = images::resolve(&mut item, true, &strings(&["http://x.com"]));

    assert!(found);
    assert_eq!(item.text("main_image"), Some("http://x.com/a.jpg"));
    assert_eq!(
        item.get("extra_images"),
        Some(&AttrValue::List(strings(&["http://x.com/b.jpg"])))
    );
    assert_eq!(
        item.get("image_urls"),
        Some(&AttrValue::List(strings(&["http://x.com/a.jpg", "http://x.com/b.jpg"])))
    );
}
