//! Localization merger
//!
//! Every `_en` attribute with an empty value receives its `_ar` counterpart
//! and vice versa. Running it twice changes nothing.

use crate::domain::item::{AttrValue, Item};
use crate::domain::value_objects::Language;

pub fn merge(item: &mut Item) {
    let localized: Vec<(String, String)> = item
        .keys()
        .filter_map(|key| {
            Language::split_key(key)
                .map(|(base, lang)| (key.clone(), format!("{base}{}", lang.counterpart().suffix())))
        })
        .collect();

    for (key, counterpart) in localized {
        let own_empty = !item.is_populated(&key);
        let other_empty = !item.is_populated(&counterpart);
        match (own_empty, other_empty) {
            (true, false) => {
                if let Some(value) = item.get(&counterpart).cloned() {
                    item.set(key, value);
                }
            }
            (false, true) => {
                if let Some(value) = item.get(&key).cloned() {
                    item.set(counterpart, value);
                }
            }
            (true, true) if !item.contains(&counterpart) => {
                item.set(counterpart, AttrValue::scalar(""));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fills_missing_counterparts_both_ways() {
        let mut item = Item::new();
        item.set("title_en", "Phone");
        item.set("price_ar", "10");
        item.set("price_en", "");
        item.set("remote_id", "1");

        merge(&mut item);

        assert_eq!(item.text("title_ar"), Some("Phone"));
        assert_eq!(item.text("price_en"), Some("10"));
        assert_eq!(item.text("remote_id"), Some("1"));
        assert!(!item.contains("remote_id_ar"));
    }

    #[test]
    fn empty_pair_gets_empty_counterpart() {
        let mut item = Item::new();
        item.set("manufacturer_en", "");
        merge(&mut item);
        assert_eq!(item.text("manufacturer_ar"), Some(""));
    }

    fn arb_item() -> impl Strategy<Value = Item> {
        let key = prop::sample::select(vec![
            "title_en", "title_ar", "price_en", "price_ar", "category_en", "model", "remote_id",
        ]);
        let value = prop::sample::select(vec!["", " ", "a", "b"]);
        prop::collection::vec((key, value), 0..8).prop_map(|entries| {
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), AttrValue::scalar(v)))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn merge_is_idempotent(item in arb_item()) {
            let mut once = item.clone();
            merge(&mut once);
            let mut twice = once.clone();
            merge(&mut twice);
            prop_assert_eq!(once, twice);
        }
    }
}
