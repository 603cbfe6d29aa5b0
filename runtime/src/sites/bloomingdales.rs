//! Bloomingdale's: product data from the `xapi` product endpoint.

use crate::acquisition::backoff::Backoff;
use crate::cartography::url::{absolutize_image, query_param, UrlFilter};
use crate::cartography::walker::WalkOptions;
use crate::config::{ScrapeConfig, SiteDefaults};
use crate::error::{HarvestError, Result};
use crate::extraction::{json_text, Columns, Field, ProductRecord};
use crate::sites::{ScrapeContext, SiteProfile};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub struct Bloomingdales;

pub const COLUMNS: Columns = &[
    ("product_id", Field::ProductId),
    ("name", Field::Name),
    ("complete_name", Field::Extra("complete_name")),
    ("brand", Field::Brand),
    ("brand_id", Field::Extra("brand_id")),
    ("division", Field::Extra("division")),
    ("department", Field::Extra("department")),
    ("top_category", Field::Category),
    ("product_url", Field::ProductUrl),
    ("price", Field::Price),
    ("formatted_price", Field::Extra("formatted_price")),
    ("color", Field::GroupAttr1),
    ("color_id", Field::Extra("color_id")),
    ("upc_id", Field::Extra("upc_id")),
    ("upc_number", Field::Gtin),
    ("sku", Field::Sku),
    ("dimensions", Field::Dimensions),
    ("materials", Field::Extra("materials")),
    ("features", Field::Description),
    ("image", Field::MainImage),
    ("scraped_date", Field::ScrapedDate),
];

/// Join a JSON list of strings with ` | `.
fn bullets(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| json_text(Some(v)))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" | "),
        other => json_text(other),
    }
}

/// Map `product[0]` of an API response onto a record.
pub fn record(page_url: &str, base_url: &str, api: &Value) -> Option<ProductRecord> {
    let product = api.get("product")?.as_array()?.first()?;
    let at = |path: &str| json_text(product.pointer(path));

    let color_id = at("/traits/colors/selectedColor");
    let color = product
        .pointer("/traits/colors/colorMap")
        .and_then(|m| m.get(&color_id))
        .map(|c| json_text(c.get("name")))
        .unwrap_or_default();

    let first_upc = product
        .pointer("/relationships/upcs")
        .and_then(|u| u.as_object())
        .and_then(|m| m.values().next());
    let upc = |key: &str| first_upc.map(|u| json_text(u.pointer(key))).unwrap_or_default();

    let mut r = ProductRecord {
        product_id: at("/id"),
        name: at("/detail/name"),
        brand: at("/detail/brand/name"),
        category: at("/relationships/taxonomy/categories/0/name"),
        product_url: at("/identifier/productUrl"),
        price: at("/pricing/price/tieredPrice/0/values/0/value"),
        group_attr_1: color,
        gtin: upc("/identifier/upcNumber"),
        sku: upc("/markStyleCode"),
        dimensions: bullets(product.pointer("/detail/dimensionsBulletText")),
        description: bullets(product.pointer("/detail/bulletText")),
        main_image: absolutize_image(&at("/imagery/images/0/filePath"), base_url),
        ..Default::default()
    };
    if r.product_url.is_empty() {
        r.product_url = page_url.to_string();
    }
    r.set(Field::Extra("complete_name"), at("/detail/completeName"));
    r.set(Field::Extra("brand_id"), at("/detail/brand/id"));
    r.set(Field::Extra("division"), at("/division/name"));
    r.set(Field::Extra("department"), at("/department/departmentName"));
    r.set(
        Field::Extra("formatted_price"),
        at("/pricing/price/tieredPrice/0/values/0/formattedValue"),
    );
    r.set(Field::Extra("color_id"), color_id);
    r.set(Field::Extra("upc_id"), upc("/id"));
    r.set(
        Field::Extra("materials"),
        bullets(product.pointer("/detail/materialsAndCare")),
    );
    (!r.product_id.is_empty()).then_some(r)
}

#[async_trait]
impl SiteProfile for Bloomingdales {
    fn key(&self) -> &'static str {
        "bloomingdales"
    }

    fn display_name(&self) -> &'static str {
        "Bloomingdale's"
    }

    fn defaults(&self) -> SiteDefaults {
        SiteDefaults {
            base_url: "https://www.bloomingdales.com",
            api_base_url: Some("https://www.bloomingdales.com/xapi/digital/v1/product"),
            request_delay_secs: 2.0,
            max_attempts: 5,
            ..Default::default()
        }
    }

    fn columns(&self) -> Columns {
        COLUMNS
    }

    fn url_filter(&self) -> UrlFilter {
        UrlFilter::including(&["/product/"])
    }

    fn walk_options(&self, config: &ScrapeConfig) -> WalkOptions {
        let mut opts = WalkOptions::new(&config.base_url);
        opts.overrides = config.sitemap_overrides.clone();
        opts.robots_attempts = 5;
        opts.robots_backoff = Backoff::Linear(Duration::from_secs(20));
        opts
    }

    async fn scrape(&self, ctx: &ScrapeContext, url: &str) -> Result<Vec<ProductRecord>> {
        let id = query_param(url, "ID")
            .ok_or_else(|| HarvestError::Extraction("No identifier found".to_string()))?;
        let api = ctx.api_base()?;
        let data: Value = ctx.http.get_json(&format!("{api}/{}", id.trim())).await?;
        record(url, ctx.base_url(), &data)
            .map(|r| vec![r])
            .ok_or_else(|| HarvestError::Extraction(format!("No API data for {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::headers;

    fn sample() -> Value {
        serde_json::json!({
            "product": [{
                "id": 5827118,
                "identifier": {"productUrl": "https://www.bloomingdales.com/shop/product/skirt?ID=5827118"},
                "detail": {
                    "name": "Lace Maxi Skirt",
                    "completeName": "Lamarque Lace Maxi Skirt",
                    "brand": {"name": "Lamarque", "id": 77},
                    "dimensionsBulletText": ["Length 40in"],
                    "materialsAndCare": ["Polyester", "Dry clean"],
                    "bulletText": ["Lined", "Zip closure"]
                },
                "division": {"name": "Women"},
                "department": {"departmentName": "Skirts"},
                "relationships": {
                    "taxonomy": {"categories": [{"name": "Clothing"}]},
                    "upcs": {"u1": {"id": 991, "markStyleCode": "LMQ-1", "identifier": {"upcNumber": "0001112223"}}}
                },
                "pricing": {"price": {"tieredPrice": [{"values": [{"value": 298.0, "formattedValue": "$298.00"}]}]}},
                "traits": {"colors": {"selectedColor": "12", "colorMap": {"12": {"name": "Black"}}}},
                "imagery": {"images": [{"filePath": "/is/image/skirt.tif"}]}
            }]
        })
    }

    #[test]
    fn test_record_fields() {
        let r = record("https://x", "https://www.bloomingdales.com", &sample()).unwrap();
        assert_eq!(r.product_id, "5827118");
        assert_eq!(r.brand, "Lamarque");
        assert_eq!(r.category, "Clothing");
        assert_eq!(r.price, "298.0");
        assert_eq!(r.group_attr_1, "Black");
        assert_eq!(r.sku, "LMQ-1");
        assert_eq!(r.gtin, "0001112223");
        assert_eq!(r.get(Field::Extra("materials")), "Polyester | Dry clean");
        assert_eq!(r.get(Field::Extra("formatted_price")), "$298.00");
        assert_eq!(r.main_image, "https://www.bloomingdales.com/is/image/skirt.tif");

        let row = r.row(COLUMNS);
        assert_eq!(row.len(), headers(COLUMNS).len());
        assert_eq!(row[2], "Lamarque Lace Maxi Skirt");
        assert_eq!(row[5], "Women");
    }

    #[test]
    fn test_record_requires_product() {
        assert!(record("https://x", "https://b", &serde_json::json!({"product": []})).is_none());
        assert!(record("https://x", "https://b", &serde_json::json!({})).is_none());
    }
}
