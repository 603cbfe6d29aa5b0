//! Emma Mason: single-product JSON-LD pages at the site root.

use crate::cartography::url::{absolutize_image, clean_url, trimmed_path, UrlFilter};
use crate::config::SiteDefaults;
use crate::error::{HarvestError, Result};
use crate::extraction::{json_text, jsonld, Columns, ProductRecord, SINGLE_VARIANT_COLUMNS};
use crate::sites::{ScrapeContext, SiteProfile};
use async_trait::async_trait;
use scraper::Html;
use serde_json::Value;

pub struct EmmaMason;

/// Product pages live directly under the root (`/sofa-123.html`); anything
/// nested, or the root itself, is a listing page.
pub fn is_listing_url(url: &str) -> bool {
    let path = trimmed_path(url);
    path.is_empty() || path.contains('/')
}

pub fn extract(html: &str, url: &str, base_url: &str) -> Option<ProductRecord> {
    let document = Html::parse_document(html);
    let block = jsonld::blocks(&document).into_iter().next()?;
    let data = jsonld::primary_node(&block)?;

    let offer = data.get("offers").filter(|o| o.is_object());
    let price = offer.map(jsonld::offer_price).unwrap_or_default();

    let record = ProductRecord {
        product_url: url.to_string(),
        name: json_text(data.get("name")),
        sku: json_text(data.get("sku")),
        brand: jsonld::brand_name(data),
        mpn: json_text(data.get("mpn")),
        gtin: json_text(data.get("gtin13")),
        quantity: "1".to_string(),
        status: "In Stock".to_string(),
        price,
        group_attr_1: json_text(data.get("description")),
        group_attr_2: material(data),
        main_image: absolutize_image(&jsonld::first_image(data), base_url),
        ..Default::default()
    };
    (!record.name.is_empty()).then_some(record)
}

fn material(data: &Value) -> String {
    match data.get("material") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| json_text(Some(v)))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => json_text(other),
    }
}

#[async_trait]
impl SiteProfile for EmmaMason {
    fn key(&self) -> &'static str {
        "emmamason"
    }

    fn display_name(&self) -> &'static str {
        "Emma Mason"
    }

    fn defaults(&self) -> SiteDefaults {
        SiteDefaults {
            base_url: "https://www.emmamason.com",
            ..Default::default()
        }
    }

    fn columns(&self) -> Columns {
        SINGLE_VARIANT_COLUMNS
    }

    fn url_filter(&self) -> UrlFilter {
        UrlFilter::default()
    }

    fn normalize_url(&self, url: &str) -> String {
        clean_url(url)
    }

    fn skip_reason(&self, url: &str) -> Option<&'static str> {
        is_listing_url(url).then_some("PLP URL skipped")
    }

    async fn scrape(&self, ctx: &ScrapeContext, url: &str) -> Result<Vec<ProductRecord>> {
        let html = ctx.fetch_html(url).await?;
        extract(&html, url, ctx.base_url())
            .map(|r| vec![r])
            .ok_or_else(|| HarvestError::Extraction("No product data found in JSON-LD".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_detection() {
        assert!(is_listing_url("https://www.emmamason.com/"));
        assert!(is_listing_url("https://www.emmamason.com/living-room/sofas.html"));
        assert!(!is_listing_url("https://www.emmamason.com/acme-sofa-52165.html"));
        assert_eq!(
            EmmaMason.skip_reason("https://www.emmamason.com/a/b"),
            Some("PLP URL skipped")
        );
    }

    #[test]
    fn test_extract_first_product() {
        let html = r#"<script type="application/ld+json">{
            "@type": "Product", "name": "Acme Sofa", "sku": "AC-1", "mpn": "52165",
            "gtin13": "0840412", "brand": {"@type": "Brand", "name": "Acme"},
            "material": ["Wood", "Fabric"], "image": "/media/sofa.jpg",
            "offers": {"@type": "Offer", "lowPrice": "899.00"}
        }</script>"#;
        let r = extract(html, "https://www.emmamason.com/acme-sofa.html", "https://www.emmamason.com").unwrap();
        assert_eq!(r.name, "Acme Sofa");
        assert_eq!(r.brand, "Acme");
        assert_eq!(r.price, "899.00");
        assert_eq!(r.quantity, "1");
        assert_eq!(r.status, "In Stock");
        assert_eq!(r.group_attr_2, "Wood, Fabric");
        assert_eq!(r.main_image, "https://www.emmamason.com/media/sofa.jpg");
        assert!(r.product_id.is_empty());
    }

    #[test]
    fn test_extract_without_name_is_none() {
        let html = r#"<script type="application/ld+json">{"@type":"Product","sku":"x"}</script>"#;
        assert!(extract(html, "https://e/x.html", "https://e").is_none());
    }
}
