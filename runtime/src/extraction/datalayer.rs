//! Google Tag Manager `dataLayer.push(...)` extraction.
//!
//! The pushed arguments are JavaScript object literals, not JSON. They are
//! relaxed into JSON with a small scanner before parsing.

use crate::extraction::{json_text, ProductRecord};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

const PUSH: &str = "dataLayer.push";

/// Raw argument text of every `dataLayer.push(...)` call.
pub fn push_arguments(html: &str) -> Vec<&str> {
    let bytes = html.as_bytes();
    let mut out = Vec::new();
    let mut search = 0;
    while let Some(found) = html[search..].find(PUSH) {
        let mut i = search + found + PUSH.len();
        search = i;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'(' {
            continue;
        }
        let start = i + 1;
        let mut depth = 1usize;
        i = start;
        while i < bytes.len() && depth > 0 {
            match bytes[i] {
                q @ (b'"' | b'\'') => {
                    i += 1;
                    while i < bytes.len() && bytes[i] != q {
                        i += if bytes[i] == b'\\' { 2 } else { 1 };
                    }
                }
                b'(' => depth += 1,
                b')' => depth -= 1,
                _ => {}
            }
            i += 1;
        }
        if depth == 0 {
            out.push(html[start..i - 1].trim());
            search = i;
        }
    }
    out
}

/// Decode the HTML entities that commonly escape inline script text.
pub fn unescape_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Rewrite a JavaScript object literal as JSON.
///
/// Comments are dropped, bare keys quoted, single-quoted strings converted,
/// trailing commas removed and `undefined` mapped to `null`. JavaScript-only
/// string escapes (`\xNN`, `\u{...}`, `\v`, `\0`) become their JSON forms.
pub fn relax_to_json(js: &str) -> String {
    let chars: Vec<char> = js.chars().collect();
    let mut out = String::with_capacity(js.len() + 16);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                out.push('"');
                i += 1;
                while i < chars.len() && chars[i] != c {
                    match chars[i] {
                        '\\' if i + 1 < chars.len() => {
                            i = push_escape(&chars, i + 1, &mut out);
                            continue;
                        }
                        other => push_json_char(other, &mut out),
                    }
                    i += 1;
                }
                out.push('"');
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i += 2;
            }
            ',' => {
                let mut j = i + 1;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                if !matches!(chars.get(j), Some('}') | Some(']')) {
                    out.push(',');
                }
                i += 1;
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let mut j = i;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                if chars.get(j) == Some(&':') {
                    out.push('"');
                    out.push_str(&word);
                    out.push('"');
                } else if word == "undefined" {
                    out.push_str("null");
                } else {
                    out.push_str(&word);
                }
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    out
}

/// Translate the JavaScript escape starting at `chars[i]` (just past the
/// backslash) into JSON. Returns the index after the escape.
fn push_escape(chars: &[char], i: usize, out: &mut String) -> usize {
    let hex = |from: usize, to: usize| -> Option<u32> {
        let digits = chars.get(from..to)?;
        if digits.is_empty() || !digits.iter().all(char::is_ascii_hexdigit) {
            return None;
        }
        u32::from_str_radix(&digits.iter().collect::<String>(), 16).ok()
    };
    match chars[i] {
        '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' => {
            out.push('\\');
            out.push(chars[i]);
            i + 1
        }
        'x' => match hex(i + 1, i + 3) {
            Some(code) => {
                out.push_str(&format!("\\u{code:04x}"));
                i + 3
            }
            None => {
                out.push('x');
                i + 1
            }
        },
        'u' if chars.get(i + 1) == Some(&'{') => {
            let close = chars[i + 2..].iter().position(|&c| c == '}').map(|p| i + 2 + p);
            match close.and_then(|end| Some((end, char::from_u32(hex(i + 2, end)?)?))) {
                Some((end, ch)) => {
                    push_json_char(ch, out);
                    end + 1
                }
                None => {
                    out.push('u');
                    i + 1
                }
            }
        }
        'u' if hex(i + 1, i + 5).is_some() => {
            out.push('\\');
            out.extend(&chars[i..i + 5]);
            i + 5
        }
        'v' => {
            out.push_str("\\u000b");
            i + 1
        }
        '0' => {
            out.push_str("\\u0000");
            i + 1
        }
        // Line continuation.
        '\n' => i + 1,
        other => {
            push_json_char(other, out);
            i + 1
        }
    }
}

fn push_json_char(ch: char, out: &mut String) {
    match ch {
        '"' => out.push_str("\\\""),
        '\\' => out.push_str("\\\\"),
        c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
        c => out.push(c),
    }
}

/// Parse every push argument on the page. Unparseable entries are skipped.
pub fn entries(html: &str) -> Vec<Value> {
    push_arguments(html)
        .into_iter()
        .filter_map(|raw| {
            let relaxed = relax_to_json(&unescape_entities(raw));
            match serde_json::from_str::<Value>(&relaxed) {
                Ok(v) => Some(v),
                Err(e) => {
                    debug!("failed parsing dataLayer entry: {e}");
                    None
                }
            }
        })
        .collect()
}

/// Every element of a `products`/`items` array anywhere in the entries,
/// deduplicated by `id`/`item_id`.
pub fn products(entries: &[Value]) -> Vec<Value> {
    fn walk(value: &Value, out: &mut Vec<Value>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    match child {
                        Value::Array(items) if key == "products" || key == "items" => {
                            out.extend(items.iter().cloned())
                        }
                        _ => walk(child, out),
                    }
                }
            }
            Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
            _ => {}
        }
    }

    let mut all = Vec::new();
    entries.iter().for_each(|e| walk(e, &mut all));

    let mut seen = HashSet::new();
    all.into_iter()
        .filter(|item| {
            let key = json_text(item.get("id").or_else(|| item.get("item_id")));
            key.is_empty() || seen.insert(key)
        })
        .collect()
}

fn first_item<'a>(container: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    container?.get(key)?.as_array()?.first()
}

fn pick(item: &Value, keys: &[&str]) -> String {
    keys.iter()
        .map(|k| json_text(item.get(*k)))
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}

/// The product described by the page's ecommerce events.
///
/// `add_to_cart` items win, `PageView` detail products fill gaps, and any
/// other ecommerce `items` are used only when nothing else named a product.
pub fn ecommerce_product(entries: &[Value]) -> ProductRecord {
    let mut record = ProductRecord::default();
    for entry in entries.iter().filter(|e| e.is_object()) {
        let ecommerce = entry.get("ecommerce");
        match entry.get("event").and_then(|e| e.as_str()).unwrap_or("") {
            "add_to_cart" => {
                let Some(item) = first_item(ecommerce, "items") else {
                    continue;
                };
                let mut cart = ProductRecord {
                    product_id: pick(item, &["item_id"]),
                    sku: pick(item, &["item_id"]),
                    name: unescape_entities(&pick(item, &["item_name"])),
                    brand: pick(item, &["item_brand"]),
                    category: pick(item, &["item_category"]),
                    price: pick(item, &["price"]),
                    quantity: pick(item, &["quantity"]),
                    variant_id: pick(item, &["item_variant"]),
                    ..Default::default()
                };
                if cart.variant_id.is_empty() {
                    cart.variant_id = "Regular".to_string();
                }
                let currency = ecommerce
                    .map(|e| json_text(e.get("currency")))
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| "USD".to_string());
                cart.group_attr_1 = format!("Currency: {currency}");
                let value = ecommerce.map(|e| json_text(e.get("value"))).unwrap_or_default();
                if !value.is_empty() {
                    cart.group_attr_2 = format!("Total Value: {value}");
                }
                cart.merge_missing(&record);
                record = cart;
            }
            "PageView" => {
                let detail = ecommerce.and_then(|e| e.get("detail"));
                let Some(product) = first_item(detail, "products") else {
                    continue;
                };
                let fallback = ProductRecord {
                    product_id: pick(product, &["id"]),
                    sku: pick(product, &["id"]),
                    name: unescape_entities(&pick(product, &["name"])),
                    brand: pick(product, &["brand"]),
                    category: pick(product, &["category"]),
                    price: pick(product, &["price"]),
                    ..Default::default()
                };
                record.merge_missing(&fallback);
            }
            _ if record.product_id.is_empty() => {
                let Some(item) = first_item(ecommerce, "items") else {
                    continue;
                };
                record.product_id = pick(item, &["item_id", "id"]);
                record.sku = record.product_id.clone();
                record.name = unescape_entities(&pick(item, &["item_name", "name"]));
                record.brand = pick(item, &["item_brand", "brand"]);
                record.category = pick(item, &["item_category", "category"]);
                record.price = pick(item, &["price"]);
                record.quantity = pick(item, &["quantity"]);
            }
            _ => {}
        }
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<script>
      window.dataLayer = window.dataLayer || [];
      dataLayer.push({
        event: 'PageView', // page view
        ecommerce: { detail: { products: [{ id: '99064', name: 'Desk &amp; Hutch', brand: 'Bush', price: '199.99', category: 'Desks', }] } }
      });
      /* cart */
      dataLayer.push({"event":"add_to_cart","ecommerce":{"currency":"USD","value":250,"items":[{"item_id":"99064","item_name":"Desk (Oak)","item_brand":"Bush","price":250,"quantity":1}]}});
      dataLayer.push(function() { return "(not data"; });
    </script>"#;

    #[test]
    fn test_push_arguments_balanced() {
        let args = push_arguments(PAGE);
        assert_eq!(args.len(), 3);
        assert!(args[1].contains("Desk (Oak)"));
        assert!(args[2].starts_with("function"));
    }

    #[test]
    fn test_relax_to_json() {
        let js = "{ a: 'it\\'s', \"b\": [1, 2, ], c: undefined, // note\n d: 'say \"hi\"' }";
        let v: Value = serde_json::from_str(&relax_to_json(js)).unwrap();
        assert_eq!(v["a"], "it's");
        assert_eq!(v["b"], serde_json::json!([1, 2]));
        assert!(v["c"].is_null());
        assert_eq!(v["d"], "say \"hi\"");
    }

    #[test]
    fn test_relax_to_json_translates_js_escapes() {
        let js = r#"{ name: 'Caf\xe9 \u{1F6CB} sofa', sku: "A\x2DB", code: '\u00e9', note: 'tab\there', path: '\/p\/1', odd: '\d', q: '\x22' }"#;
        let v: Value = serde_json::from_str(&relax_to_json(js)).unwrap();
        assert_eq!(v["name"], "Caf\u{e9} \u{1F6CB} sofa");
        assert_eq!(v["sku"], "A-B");
        assert_eq!(v["code"], "\u{e9}");
        assert_eq!(v["note"], "tab\there");
        assert_eq!(v["path"], "/p/1");
        assert_eq!(v["odd"], "d");
        assert_eq!(v["q"], "\"");
    }

    #[test]
    fn test_entry_with_hex_escape_is_kept() {
        let html = r#"<script>dataLayer.push({ event: 'view', name: 'Oak \x26 Ash' });</script>"#;
        let found = entries(html);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["name"], "Oak & Ash");
    }

    #[test]
    fn test_entries_and_products() {
        let parsed = entries(PAGE);
        assert_eq!(parsed.len(), 2);
        // The PageView product and the cart item share id 99064.
        assert_eq!(products(&parsed).len(), 1);
    }

    #[test]
    fn test_ecommerce_product_prefers_cart() {
        let record = ecommerce_product(&entries(PAGE));
        assert_eq!(record.product_id, "99064");
        assert_eq!(record.name, "Desk (Oak)");
        assert_eq!(record.price, "250");
        assert_eq!(record.category, "Desks");
        assert_eq!(record.variant_id, "Regular");
        assert_eq!(record.group_attr_1, "Currency: USD");
        assert_eq!(record.group_attr_2, "Total Value: 250");
    }

    #[test]
    fn test_products_dedupe() {
        let a: Value = serde_json::json!({"ecommerce":{"items":[{"item_id":"1"},{"item_id":"1"},{"name":"x"}]}});
        assert_eq!(products(&[a]).len(), 2);
    }
}
