use meridian_core::{display_message, normalize_detail, FilterParams, FilterValue, KeyFactory};
use proptest::prelude::*;
use serde_json::{json, Value};

fn filter_value() -> impl Strategy<Value = FilterValue> {
    prop_oneof![
        any::<bool>().prop_map(FilterValue::Bool),
        any::<i64>().prop_map(FilterValue::Int),
        "[a-z]{0,8}".prop_map(FilterValue::Str),
        prop::collection::vec("[a-z]{1,4}", 0..3)
            .prop_map(|v| FilterValue::List(v.into_iter().map(FilterValue::Str).collect())),
    ]
}

fn filter_entries() -> impl Strategy<Value = Vec<(String, Option<FilterValue>)>> {
    prop::collection::btree_map("[a-z_]{1,10}", prop::option::of(filter_value()), 0..6)
        .prop_map(|map| map.into_iter().collect())
}

fn detail_item() -> impl Strategy<Value = Value> {
    (
        prop::collection::vec("[a-z]{1,6}", 1..3),
        "[a-z][a-z ]{0,15}",
    )
        .prop_map(|(loc, msg)| json!({ "loc": loc, "msg": msg }))
}

proptest! {
    #[test]
    fn list_key_ignores_insertion_order(entries in filter_entries(), seed in any::<u64>()) {
        let keys = KeyFactory::new("accounts");
        let forward: FilterParams = entries.clone().into_iter().collect();

        let mut shuffled = entries;
        let len = shuffled.len().max(1);
        shuffled.rotate_left((seed as usize) % len);
        shuffled.reverse();
        let permuted: FilterParams = shuffled.into_iter().collect();

        prop_assert_eq!(keys.list(&forward), keys.list(&permuted));
    }

    #[test]
    fn absent_filters_never_partition(entries in filter_entries(), extra in "[A-Z]{1,6}") {
        let keys = KeyFactory::new("opportunities");
        let base: FilterParams = entries.clone().into_iter().collect();
        let mut with_none = entries;
        with_none.push((extra, None::<FilterValue>));
        let padded: FilterParams = with_none.into_iter().collect();
        prop_assert_eq!(keys.list(&base), keys.list(&padded));
    }

    #[test]
    fn list_keys_stay_under_lists_prefix(entries in filter_entries()) {
        let keys = KeyFactory::new("requisitions");
        let params: FilterParams = entries.into_iter().collect();
        let key = keys.list(&params);
        prop_assert!(key.starts_with(&keys.lists()));
        prop_assert!(key.starts_with(&keys.all()));
        prop_assert!(!key.starts_with(&keys.details()));
    }

    #[test]
    fn flattening_is_idempotent(items in prop::collection::vec(detail_item(), 1..5)) {
        let payload = Value::Array(items);
        let first = display_message(&normalize_detail(&payload));
        let second = display_message(&normalize_detail(&payload));
        prop_assert_eq!(&first, &second);
        prop_assert!(first.is_some());
        let flattened = first.unwrap_or_default();
        let again = display_message(&normalize_detail(&Value::String(flattened.clone())));
        prop_assert_eq!(again, Some(flattened));
    }
}
