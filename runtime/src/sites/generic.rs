//! Any schema.org-annotated storefront: JSON-LD, then microdata.

use crate::cartography::url::{absolutize_image, UrlFilter};
use crate::config::SiteDefaults;
use crate::error::{HarvestError, Result};
use crate::extraction::{jsonld, microdata, ProductRecord};
use crate::sites::{ScrapeContext, SiteProfile};
use async_trait::async_trait;
use scraper::Html;

pub struct Generic;

/// Every variant row of the first JSON-LD product on the page.
pub fn jsonld_records(document: &Html, url: &str, base_url: &str) -> Vec<ProductRecord> {
    let blocks = jsonld::blocks(document);
    let Some(root) = blocks
        .iter()
        .flat_map(jsonld::nodes)
        .find(|n| jsonld::is_product(n))
    else {
        return Vec::new();
    };

    let crumbs = jsonld::breadcrumbs(&blocks);
    // The last crumb is usually the product itself.
    let category = match crumbs.len() {
        0 => None,
        1 => crumbs.first(),
        n => crumbs.get(n - 2),
    };

    let mut records = jsonld::variant_records(root, "", |_| None);
    for r in &mut records {
        r.product_url = url.to_string();
        r.main_image = absolutize_image(&r.main_image, base_url);
        if let Some(c) = category {
            r.category = c.name.clone();
            r.category_url = c.url.clone().unwrap_or_default();
        }
    }
    records.retain(|r| !r.name.is_empty());
    records
}

pub fn from_jsonld(document: &Html, url: &str, base_url: &str) -> Option<ProductRecord> {
    jsonld_records(document, url, base_url).into_iter().next()
}

/// JSON-LD rows, or one microdata row when the page has no JSON-LD product.
pub fn extract(html: &str, url: &str, base_url: &str) -> Vec<ProductRecord> {
    let document = Html::parse_document(html);
    let records = jsonld_records(&document, url, base_url);
    if !records.is_empty() {
        return records;
    }
    let mut r = microdata::product(&document);
    if r.name.is_empty() {
        return Vec::new();
    }
    r.product_url = url.to_string();
    r.main_image = absolutize_image(&r.main_image, base_url);
    vec![r]
}

#[async_trait]
impl SiteProfile for Generic {
    fn key(&self) -> &'static str {
        "generic"
    }

    fn display_name(&self) -> &'static str {
        "Generic schema.org storefront"
    }

    fn defaults(&self) -> SiteDefaults {
        SiteDefaults::default()
    }

    fn url_filter(&self) -> UrlFilter {
        UrlFilter::default().without_images()
    }

    async fn scrape(&self, ctx: &ScrapeContext, url: &str) -> Result<Vec<ProductRecord>> {
        let html = ctx.fetch_html(url).await?;
        let records = extract(&html, url, ctx.base_url());
        if records.is_empty() {
            return Err(HarvestError::Extraction("No product data found".to_string()));
        }
        Ok(records)
    }
}
