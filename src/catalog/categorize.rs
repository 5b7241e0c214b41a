use std::collections::HashMap;

use indexmap::IndexMap;

use crate::catalog::product::Product;

/// Static category-key to upstream group-id table. Keys are fixed at
/// startup; a `None` value marks a category with no known upstream group,
/// which stays permanently empty.
pub type CategoryMap = IndexMap<String, Option<i64>>;

/// The store's category table as shipped. Overridable via `CATEGORY_GROUPS`.
pub fn default_category_map() -> CategoryMap {
    IndexMap::from([
        ("solar-panels".to_string(), Some(97668952)),
        ("inverters".to_string(), Some(130134486)),
        ("fuses".to_string(), None),
        ("ups".to_string(), None),
        ("cables".to_string(), Some(130135807)),
        ("optimizers".to_string(), Some(130139474)),
        ("controllers".to_string(), None),
        ("mounting".to_string(), Some(130139468)),
        ("batteries".to_string(), Some(140995307)),
        ("drone-batteries".to_string(), None),
        ("charging-stations".to_string(), None),
        ("mushrooms".to_string(), None),
        ("boilers".to_string(), None),
        ("air-conditioners".to_string(), Some(130300043)),
    ])
}

/// Partition `products` by the category table. Every key gets an entry,
/// possibly empty; a product lands in a category iff its `group.id` equals
/// that category's mapped group-id. Products with no group, an unmapped
/// group, or a group mapped by a `None` entry go to no category (they stay
/// in the unfiltered set). Pure function; input is not mutated.
pub fn categorize(products: &[Product], map: &CategoryMap) -> IndexMap<String, Vec<Product>> {
    let mut by_group: HashMap<i64, &str> = HashMap::new();
    for (key, group_id) in map {
        if let Some(g) = group_id {
            by_group.insert(*g, key.as_str());
        }
    }

    let mut out: IndexMap<String, Vec<Product>> =
        map.keys().map(|k| (k.clone(), Vec::new())).collect();

    for product in products {
        let Some(group_id) = product.group_id() else {
            continue;
        };
        if let Some(key) = by_group.get(&group_id) {
            if let Some(bucket) = out.get_mut(*key) {
                bucket.push(product.clone());
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product(id: i64, group: Option<i64>) -> Product {
        let value = match group {
            Some(g) => json!({"id": id, "group": {"id": g}}),
            None => json!({"id": id}),
        };
        serde_json::from_value(value).unwrap()
    }

    fn map() -> CategoryMap {
        IndexMap::from([
            ("solar-panels".to_string(), Some(97668952)),
            ("fuses".to_string(), None),
            ("batteries".to_string(), Some(140995307)),
        ])
    }

    #[test]
    fn every_key_gets_an_entry_and_partition_is_exact() {
        let products = vec![
            product(1, Some(97668952)),
            product(2, None),
            product(3, Some(140995307)),
            product(4, Some(97668952)),
            product(5, Some(555)), // unmapped group
        ];
        let out = categorize(&products, &map());

        assert_eq!(out.len(), 3);
        let panels: Vec<String> = out["solar-panels"].iter().map(Product::id_key).collect();
        assert_eq!(panels, vec!["1", "4"]);
        assert_eq!(out["batteries"].len(), 1);
        // Every categorized product carries exactly the mapped group id.
        for p in &out["solar-panels"] {
            assert_eq!(p.group_id(), Some(97668952));
        }
    }

    #[test]
    fn null_mapped_categories_stay_empty() {
        let products = vec![product(1, Some(97668952)), product(2, None)];
        let out = categorize(&products, &map());
        assert!(out["fuses"].is_empty());
    }

    #[test]
    fn relative_order_of_the_source_sequence_is_preserved() {
        let products = vec![
            product(9, Some(97668952)),
            product(3, Some(97668952)),
            product(7, Some(97668952)),
        ];
        let out = categorize(&products, &map());
        let keys: Vec<String> = out["solar-panels"].iter().map(Product::id_key).collect();
        assert_eq!(keys, vec!["9", "3", "7"]);
    }

    #[test]
    fn a_product_matches_at_most_one_category() {
        let products = vec![product(1, Some(97668952))];
        let out = categorize(&products, &map());
        let hits: usize = out.values().map(Vec::len).sum();
        assert_eq!(hits, 1);
    }

    #[test]
    fn input_is_not_consumed_or_mutated() {
        let products = vec![product(1, Some(97668952))];
        let before = serde_json::to_string(&products).unwrap();
        let _ = categorize(&products, &map());
        assert_eq!(serde_json::to_string(&products).unwrap(), before);
    }
}
