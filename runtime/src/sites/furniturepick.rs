//! FurniturePick / FurnitureCart: JSON-LD when present, page markup otherwise.

use crate::cartography::url::{absolutize_image, UrlFilter};
use crate::cartography::walker::WalkOptions;
use crate::config::{ScrapeConfig, SiteDefaults};
use crate::error::{HarvestError, Result};
use crate::extraction::microdata::{all, select_attr, select_text, text_of};
use crate::extraction::{jsonld, Field, ProductRecord};
use crate::sites::{generic, ScrapeContext, SiteProfile};
use async_trait::async_trait;
use scraper::Html;

pub struct FurniturePick;

/// Fields from the product page markup.
pub fn extract_markup(document: &Html, url: &str, base_url: &str) -> ProductRecord {
    let crumbs: Vec<String> = all(document, r#"nav[aria-label="breadcrumb"] li"#)
        .into_iter()
        .map(text_of)
        .filter(|t| !t.is_empty())
        .collect();
    let images: Vec<String> = all(document, "img.product-image")
        .into_iter()
        .filter_map(|img| img.value().attr("src"))
        .map(|src| absolutize_image(src, base_url))
        .collect();
    let availability =
        select_attr(document, r#"link[itemprop="availability"]"#, "href").unwrap_or_default();

    let mut r = ProductRecord {
        product_url: url.to_string(),
        name: select_text(document, "h1").unwrap_or_default(),
        price: select_text(document, "span.price").unwrap_or_default(),
        sku: select_text(document, r#"span[itemprop="sku"]"#).unwrap_or_default(),
        brand: select_text(document, r#"span[itemprop="brand"]"#).unwrap_or_default(),
        category: crumbs.join(" > "),
        description: select_attr(document, r#"meta[name="description"]"#, "content")
            .unwrap_or_default(),
        main_image: images.first().cloned().unwrap_or_default(),
        ..Default::default()
    };
    if !availability.is_empty() {
        r.status = jsonld::availability_status(&availability).to_string();
    }
    if images.len() > 1 {
        r.set(Field::Extra("image_urls"), images.join(", "));
    }
    r
}

pub fn extract(html: &str, url: &str, base_url: &str) -> Option<ProductRecord> {
    let document = Html::parse_document(html);
    let mut record = generic::from_jsonld(&document, url, base_url).unwrap_or_default();
    record.merge_missing(&extract_markup(&document, url, base_url));
    (!record.name.is_empty()).then_some(record)
}

#[async_trait]
impl SiteProfile for FurniturePick {
    fn key(&self) -> &'static str {
        "furniturepick"
    }

    fn display_name(&self) -> &'static str {
        "FurniturePick / FurnitureCart"
    }

    fn defaults(&self) -> SiteDefaults {
        SiteDefaults {
            base_url: "https://www.furniturepick.com",
            ..Default::default()
        }
    }

    fn url_filter(&self) -> UrlFilter {
        UrlFilter::including(&["/product/", "/item/", "/p/"]).without_images()
    }

    fn walk_options(&self, config: &ScrapeConfig) -> WalkOptions {
        let mut opts = WalkOptions::new(&config.base_url);
        opts.overrides = config.sitemap_overrides.clone();
        opts.fallback_paths = vec![
            "/sitemap.xml",
            "/sitemap_index.xml",
            "/sitemap/sitemap.xml",
            "/sitemap/sitemap-index.xml",
        ];
        opts
    }

    async fn scrape(&self, ctx: &ScrapeContext, url: &str) -> Result<Vec<ProductRecord>> {
        let html = ctx.fetch_html(url).await?;
        extract(&html, url, ctx.base_url())
            .map(|r| vec![r])
            .ok_or_else(|| HarvestError::Extraction("No product data found".to_string()))
    }
}
