//! BisonOffice: microdata product pages, dataLayer filling the gaps.
//!
//! Every request to the site carries `bo=0`.

use crate::cartography::url::{
    absolutize_image, clean_url, last_path_segment, resolve, with_query_param, UrlFilter,
};
use crate::cartography::walker::WalkOptions;
use crate::config::{ScrapeConfig, SiteDefaults};
use crate::error::{HarvestError, Result};
use crate::extraction::microdata::{first, first_number, itemprop, select_attr, text_of, within};
use crate::extraction::{datalayer, Field, ProductRecord};
use crate::sites::{ScrapeContext, SiteProfile};
use async_trait::async_trait;
use scraper::Html;

pub struct BisonOffice;

fn with_bo(url: &str) -> String {
    with_query_param(url, "bo", "0")
}

/// Fields from the product page markup.
pub fn extract_html(document: &Html, url: &str, base_url: &str) -> ProductRecord {
    let mut r = ProductRecord {
        product_url: url.to_string(),
        ..Default::default()
    };

    if let Some(id) = itemprop(document, "productId").and_then(|t| first_number(&t)) {
        r.product_id = id;
    }
    if let Some(gtin) = select_attr(document, r#"meta[itemprop="gtin12"]"#, "content") {
        r.gtin = gtin;
    }
    if let Some(el) = first(document, r#"div[itemprop="name"]"#) {
        r.name = text_of(el);
    }
    if let Some(link) = first(document, r#"div[itemprop="brand"] a"#) {
        r.brand = text_of(link);
        if let Some(href) = link.value().attr("href").and_then(|h| resolve(base_url, h)) {
            r.set(Field::Extra("brand_url"), with_bo(&href));
        }
    }
    r.price = select_attr(document, r#"div[itemprop="price"]"#, "content")
        .or_else(|| select_attr(document, r#"div[itemprop="offers"] div[itemprop="price"]"#, "content"))
        .unwrap_or_default();

    let image = select_attr(document, r#"meta[itemprop="image"]"#, "content")
        .or_else(|| select_attr(document, "img#myimage", "src"));
    if let Some(src) = image {
        r.main_image = with_bo(&absolutize_image(&src, base_url));
    }

    r.quantity = first(document, "div.product-main__info-prices-item-maxqty")
        .and_then(|el| {
            let text = text_of(el);
            let (_, after) = text.split_once("Only")?;
            first_number(after)
        })
        .unwrap_or_else(|| "1".to_string());

    if let Some(menu) = first(document, "div.menu__container") {
        let links = within(menu, "a");
        if links.len() >= 2 {
            let category = links[links.len() - 2];
            r.category = text_of(category);
            if let Some(href) = category.value().attr("href") {
                r.category_url = resolve(base_url, href).unwrap_or_else(|| href.to_string());
            }
        }
    }

    if let Some(specs) = first(document, "div.products-main__filter") {
        for item in within(specs, "li.products-main__filter-item-content-list-item") {
            let cells = within(item, r#"div[class*="item-name"]"#);
            if cells.len() < 2 {
                continue;
            }
            let label = text_of(cells[0]).to_lowercase();
            let value = text_of(cells[1]);
            if label.contains("manufacturer") && label.contains("part") {
                r.mpn = value;
            } else if label.contains("model") {
                r.fill(Field::Mpn, value);
            }
        }
    }

    let hidden = |html: &str| html.contains("display: none") || html.contains("display:none");
    r.status = match first(document, "div.out-of-stock-wrapper") {
        Some(el) if !hidden(&el.html()) => "Out of Stock".to_string(),
        _ => "In Stock".to_string(),
    };
    r
}

/// Full extraction: markup first, dataLayer for missing fields.
pub fn extract(html: &str, url: &str, base_url: &str) -> Option<ProductRecord> {
    let document = Html::parse_document(html);
    let mut record = extract_html(&document, url, base_url);
    let fallback = datalayer::ecommerce_product(&datalayer::entries(html));
    for field in [Field::Name, Field::Brand, Field::Price, Field::Category, Field::VariantId] {
        record.fill(field, fallback.get(field).to_string());
    }
    if record.product_id.is_empty() {
        record.product_id = last_path_segment(url)
            .filter(|s| s.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or_default();
    }
    if record.sku.is_empty() {
        record.sku = record.product_id.clone();
    }
    if record.name.is_empty() && record.product_id.is_empty() {
        return None;
    }
    Some(record)
}

#[async_trait]
impl SiteProfile for BisonOffice {
    fn key(&self) -> &'static str {
        "bisonoffice"
    }

    fn display_name(&self) -> &'static str {
        "BisonOffice"
    }

    fn defaults(&self) -> SiteDefaults {
        SiteDefaults {
            base_url: "https://www.bisonoffice.com",
            ..Default::default()
        }
    }

    fn url_filter(&self) -> UrlFilter {
        UrlFilter::including(&["/p/"])
    }

    fn walk_options(&self, config: &ScrapeConfig) -> WalkOptions {
        let mut opts = WalkOptions::new(&config.base_url);
        opts.overrides = config.sitemap_overrides.iter().map(|u| with_bo(u)).collect();
        opts.fallback_paths = vec!["/sitemap_index.xml?bo=0", "/sitemap.xml?bo=0"];
        opts
    }

    fn normalize_url(&self, url: &str) -> String {
        with_bo(&clean_url(url))
    }

    async fn scrape(&self, ctx: &ScrapeContext, url: &str) -> Result<Vec<ProductRecord>> {
        let html = ctx.fetch_html(url).await?;
        extract(&html, url, ctx.base_url())
            .map(|r| vec![r])
            .ok_or_else(|| HarvestError::Extraction("Insufficient product data".to_string()))
    }
}
