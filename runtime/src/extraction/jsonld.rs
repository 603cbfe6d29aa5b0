//! JSON-LD product extraction.
//!
//! Reads every `<script type="application/ld+json">` block, flattens arrays
//! and `@graph` containers, and maps `Product`/`ProductGroup` nodes (with
//! their `hasVariant` children) onto [`ProductRecord`]s.

use crate::extraction::{json_text, ProductRecord};
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

/// A breadcrumb item from a JSON-LD BreadcrumbList.
#[derive(Debug, Clone)]
pub struct BreadcrumbItem {
    pub name: String,
    pub url: Option<String>,
    pub position: u32,
}

/// Parse every JSON-LD block in the document. Malformed blocks are skipped.
pub fn blocks(document: &Html) -> Vec<Value> {
    let Ok(sel) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for element in document.select(&sel) {
        let text = element.inner_html();
        let text = text.trim().trim_end_matches(';');
        if text.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(text) {
            Ok(value) => out.push(value),
            Err(e) => debug!("skipping malformed JSON-LD block: {e}"),
        }
    }
    out
}

/// Every object node in a block: top-level arrays and `@graph` are expanded.
pub fn nodes(value: &Value) -> Vec<&Value> {
    let mut out = Vec::new();
    collect_nodes(value, &mut out);
    out
}

fn collect_nodes<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_nodes(item, out);
            }
        }
        Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                collect_nodes(graph, out);
            }
            out.push(value);
        }
        _ => {}
    }
}

/// Whether `@type` (string or array) names `ty`.
pub fn has_type(value: &Value, ty: &str) -> bool {
    match value.get("@type") {
        Some(Value::String(s)) => s == ty,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(ty)),
        _ => false,
    }
}

pub fn is_product(value: &Value) -> bool {
    has_type(value, "Product") || has_type(value, "ProductGroup")
}

/// The node a page-level extractor should read from a block: the first
/// product node, or the block's first object when nothing is typed.
pub fn primary_node(block: &Value) -> Option<&Value> {
    let all = nodes(block);
    all.iter()
        .copied()
        .find(|n| is_product(n))
        .or_else(|| match block {
            Value::Array(items) => items.first().filter(|v| v.is_object()),
            Value::Object(_) => Some(block),
            _ => None,
        })
}

/// Offers as a list, whether the source holds an array or a single object.
pub fn offers(value: &Value) -> Vec<&Value> {
    match value.get("offers") {
        Some(Value::Array(items)) => items.iter().filter(|o| o.is_object()).collect(),
        Some(o @ Value::Object(_)) => {
            // AggregateOffer may nest individual offers.
            match o.get("offers") {
                Some(Value::Array(inner)) if !inner.is_empty() => {
                    let mut list = vec![o];
                    list.extend(inner.iter().filter(|x| x.is_object()));
                    list
                }
                _ => vec![o],
            }
        }
        _ => Vec::new(),
    }
}

/// `price`, falling back to `lowPrice`.
pub fn offer_price(offer: &Value) -> String {
    let price = json_text(offer.get("price"));
    if !price.is_empty() {
        return price;
    }
    json_text(offer.get("lowPrice"))
}

/// Brand as an object with `name`, or a plain string.
pub fn brand_name(value: &Value) -> String {
    match value.get("brand") {
        Some(b @ Value::Object(_)) => json_text(b.get("name")),
        other => json_text(other),
    }
}

/// First image whether `image` is a string, array, or ImageObject.
pub fn first_image(value: &Value) -> String {
    fn image_text(v: &Value) -> String {
        match v {
            Value::String(s) => s.trim().to_string(),
            Value::Object(_) => json_text(v.get("url").or_else(|| v.get("contentUrl"))),
            _ => String::new(),
        }
    }
    match value.get("image") {
        Some(Value::Array(items)) => items.first().map(image_text).unwrap_or_default(),
        Some(v) => image_text(v),
        None => String::new(),
    }
}

/// Map a schema.org availability URL onto the CSV status text.
pub fn availability_status(availability: &str) -> &'static str {
    if availability.contains("InStock") {
        "In Stock"
    } else {
        "Out of Stock"
    }
}

/// Breadcrumb trail from any BreadcrumbList in the blocks.
pub fn breadcrumbs(blocks: &[Value]) -> Vec<BreadcrumbItem> {
    for block in blocks {
        for node in nodes(block) {
            if has_type(node, "BreadcrumbList") {
                return parse_breadcrumbs(node);
            }
        }
    }
    Vec::new()
}

fn parse_breadcrumbs(v: &Value) -> Vec<BreadcrumbItem> {
    let mut items = Vec::new();
    if let Some(list) = v.get("itemListElement").and_then(|l| l.as_array()) {
        for item in list {
            let name = item
                .get("name")
                .or_else(|| item.get("item").and_then(|i| i.get("name")))
                .and_then(|n| n.as_str())
                .unwrap_or("")
                .to_string();
            let url = item
                .get("item")
                .and_then(|i| {
                    i.as_str()
                        .or_else(|| i.get("@id").and_then(|id| id.as_str()))
                })
                .map(|s| s.to_string());
            let position = item.get("position").and_then(|p| p.as_u64()).unwrap_or(0) as u32;
            items.push(BreadcrumbItem {
                name,
                url,
                position,
            });
        }
    }
    items.sort_by_key(|i| i.position);
    items
}

/// Build one record per variant of `root` (`hasVariant`, or `root` itself).
///
/// When the offers are a list, the offer whose URL resolves to
/// `page_product_id` via `id_of` is chosen; otherwise the first.
pub fn variant_records<F>(root: &Value, page_product_id: &str, id_of: F) -> Vec<ProductRecord>
where
    F: Fn(&str) -> Option<String>,
{
    let variants: Vec<&Value> = match root.get("hasVariant") {
        Some(Value::Array(items)) if !items.is_empty() => {
            items.iter().filter(|v| v.is_object()).collect()
        }
        _ => vec![root],
    };
    let root_offer_price = match root.get("offers") {
        Some(o @ Value::Object(_)) => json_text(o.get("price")),
        _ => String::new(),
    };

    variants
        .into_iter()
        .map(|variant| {
            let offer_list = offers(variant);
            let selected = offer_list
                .iter()
                .copied()
                .find(|o| {
                    !page_product_id.is_empty()
                        && o.get("url")
                            .and_then(|u| u.as_str())
                            .and_then(|u| id_of(u))
                            .as_deref()
                            == Some(page_product_id)
                })
                .or_else(|| offer_list.first().copied());

            let mut price = selected.map(offer_price).unwrap_or_default();
            if price.is_empty() {
                price = root_offer_price.clone();
            }
            let availability = format!(
                "{} {}",
                selected
                    .map(|o| json_text(o.get("availability")))
                    .unwrap_or_default(),
                json_text(variant.get("availability"))
            );
            let mut brand = brand_name(variant);
            if brand.is_empty() {
                brand = brand_name(root);
            }
            let mpn = {
                let model = json_text(variant.get("model"));
                if model.is_empty() {
                    json_text(variant.get("mpn"))
                } else {
                    model
                }
            };
            let gtin = {
                let g13 = json_text(variant.get("gtin13"));
                if g13.is_empty() {
                    json_text(variant.get("gtin"))
                } else {
                    g13
                }
            };
            let quantity = variant
                .get("inventory")
                .map(|inv| json_text(inv.get("quantityAvailable")))
                .filter(|q| !q.is_empty())
                .unwrap_or_else(|| "0".to_string());

            ProductRecord {
                product_id: page_product_id.to_string(),
                variant_id: json_text(variant.get("variationId")),
                name: json_text(variant.get("name")),
                sku: json_text(variant.get("sku")),
                brand,
                mpn,
                gtin,
                price,
                quantity,
                status: availability_status(&availability).to_string(),
                group_attr_1: json_text(variant.get("description")),
                group_attr_2: json_text(variant.get("color")),
                main_image: first_image(variant),
                ..Default::default()
            }
        })
        .collect()
}
