//! Mapping from Storefront API product nodes to stored [`Product`] records.
//!
//! Everything here is pure: the write timestamp is passed in so that the
//! same node always maps to the same record.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::model::{product_key, Image, Money, Product, SelectedOption, Variant};

/// Transform one raw product node into a [`Product`].
///
/// Returns `None` when the node carries no usable `id`, since such a record
/// cannot be keyed. Missing optional fields become `None` or empty collections.
pub fn transform_product(storefront_id: &str, raw: &Value, now: DateTime<Utc>) -> Option<Product> {
    let source_id = scalar_string(raw.get("id"))?;

    let price_range = raw.get("priceRange");

    Some(Product {
        id: product_key(storefront_id, &source_id),
        storefront_id: storefront_id.to_string(),
        source_id,
        handle: string_field(raw, "handle"),
        title: string_field(raw, "title"),
        vendor: string_field(raw, "vendor"),
        product_type: string_field(raw, "productType"),
        description: string_field(raw, "description"),
        tags: raw
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(|t| t.as_str().map(String::from)).collect())
            .unwrap_or_default(),
        available_for_sale: raw.get("availableForSale").and_then(Value::as_bool),
        source_created_at: string_field(raw, "createdAt"),
        source_updated_at: string_field(raw, "updatedAt"),
        min_price: price_range.and_then(|p| money(p.get("minVariantPrice"))),
        max_price: price_range.and_then(|p| money(p.get("maxVariantPrice"))),
        variants: connection_nodes(raw.get("variants"))
            .iter()
            .map(variant)
            .collect(),
        images: connection_nodes(raw.get("images"))
            .iter()
            .map(image)
            .collect(),
        sniffer_updated_at: now,
        traversal_id: None,
        removed_at: None,
    })
}

/// Coerce an upstream money amount (string or number) to decimal-string form.
pub fn decimal_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(format!("{}.00", i))
            } else {
                n.as_f64().map(|f| format!("{:.2}", f))
            }
        }
        _ => None,
    }
}

fn money(value: Option<&Value>) -> Option<Money> {
    let value = value?;
    // Older API versions return a bare amount instead of a MoneyV2 object
    if !value.is_object() {
        return decimal_string(value).map(|amount| Money {
            amount,
            currency_code: None,
        });
    }
    Some(Money {
        amount: decimal_string(value.get("amount")?)?,
        currency_code: string_field(value, "currencyCode"),
    })
}

fn variant(raw: &Value) -> Variant {
    Variant {
        id: scalar_string(raw.get("id")),
        title: string_field(raw, "title"),
        sku: string_field(raw, "sku"),
        available_for_sale: raw.get("availableForSale").and_then(Value::as_bool),
        price: money(raw.get("price")),
        compare_at_price: money(raw.get("compareAtPrice")),
        selected_options: raw
            .get("selectedOptions")
            .and_then(Value::as_array)
            .map(|options| {
                options
                    .iter()
                    .filter_map(|o| {
                        Some(SelectedOption {
                            name: o.get("name")?.as_str()?.to_string(),
                            value: o.get("value")?.as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default(),
        image: raw.get("image").filter(|v| v.is_object()).map(image),
    }
}

fn image(raw: &Value) -> Image {
    Image {
        id: scalar_string(raw.get("id")),
        url: string_field(raw, "url").or_else(|| string_field(raw, "src")),
        alt_text: string_field(raw, "altText"),
        width: dimension(raw.get("width")),
        height: dimension(raw.get("height")),
    }
}

/// Nodes of a GraphQL connection, accepting both `nodes` and `edges[].node`.
fn connection_nodes(value: Option<&Value>) -> Vec<Value> {
    let Some(value) = value else {
        return Vec::new();
    };
    if let Some(nodes) = value.get("nodes").and_then(Value::as_array) {
        return nodes.clone();
    }
    if let Some(edges) = value.get("edges").and_then(Value::as_array) {
        return edges.iter().filter_map(|e| e.get("node").cloned()).collect();
    }
    Vec::new()
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(String::from)
}

fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn dimension(value: Option<&Value>) -> Option<u32> {
    value
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}
