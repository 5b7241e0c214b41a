use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single upstream catalog product.
///
/// The upstream payload carries far more fields than the proxy interprets
/// (prices, descriptions, images, ...). Only `id`, `group` and `name` are
/// read here; everything else is captured verbatim in `rest` and forwarded
/// to API clients untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Upstream sends numeric ids; tolerate strings as well.
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<ProductGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductGroup {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl Product {
    /// Canonical string form of the product id. Numbers render without
    /// quotes, so `42` and `"42"` compare equal.
    pub fn id_key(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Numeric id when the upstream id is a number (or a numeric string).
    pub fn numeric_id(&self) -> Option<i64> {
        self.id.as_i64().or_else(|| self.id_key().parse().ok())
    }

    pub fn group_id(&self) -> Option<i64> {
        self.group.as_ref().and_then(|g| g.id)
    }
}

/// One page of the upstream paginated list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPage {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub last_id: Option<Value>,
}

impl ProductPage {
    /// Cursor for the next page, canonicalized to a string. `None` means the
    /// upstream reported the end of the list.
    pub fn next_cursor(&self) -> Option<String> {
        match &self.last_id {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_key_is_quote_insensitive() {
        let a: Product = serde_json::from_value(serde_json::json!({"id": 42})).unwrap();
        let b: Product = serde_json::from_value(serde_json::json!({"id": "42"})).unwrap();
        assert_eq!(a.id_key(), b.id_key());
        assert_eq!(a.numeric_id(), Some(42));
        assert_eq!(b.numeric_id(), Some(42));
    }

    #[test]
    fn passthrough_fields_survive_a_round_trip() {
        let raw = serde_json::json!({
            "id": 7,
            "name": "Panel 450W",
            "group": {"id": 97668952, "name": "Panels"},
            "price": "12 999",
            "images": [{"url": "https://cdn.example.com/p7.jpg"}]
        });
        let product: Product = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(product.group_id(), Some(97668952));
        let back = serde_json::to_value(&product).unwrap();
        assert_eq!(back["price"], raw["price"]);
        assert_eq!(back["images"], raw["images"]);
        assert_eq!(back["group"]["name"], raw["group"]["name"]);
    }

    #[test]
    fn page_cursor_handles_null_and_numbers() {
        let page: ProductPage =
            serde_json::from_value(serde_json::json!({"products": [], "last_id": null})).unwrap();
        assert_eq!(page.next_cursor(), None);

        let page: ProductPage =
            serde_json::from_value(serde_json::json!({"products": [], "last_id": 123})).unwrap();
        assert_eq!(page.next_cursor(), Some("123".to_string()));
    }
}
