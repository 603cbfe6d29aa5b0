//! Walmart: `/ip/` product pages, one row per JSON-LD variant.

use crate::cartography::url::{clean_url, last_path_segment, UrlFilter};
use crate::cartography::walker::WalkOptions;
use crate::config::{ScrapeConfig, SiteDefaults};
use crate::error::{HarvestError, Result};
use crate::extraction::{jsonld, ProductRecord};
use crate::sites::{ScrapeContext, SiteProfile};
use async_trait::async_trait;
use regex::Regex;
use scraper::Html;
use std::sync::OnceLock;

static RE_ITEM_ID: OnceLock<Regex> = OnceLock::new();

pub struct Walmart;

/// Numeric item id from `/ip/{slug}/{id}` or `/ip/{id}`.
pub fn product_id(url: &str) -> Option<String> {
    let re = RE_ITEM_ID.get_or_init(|| Regex::new(r"/ip/(?:[^/]+/)?(\d+)").unwrap());
    if let Some(caps) = re.captures(url) {
        return Some(caps[1].to_string());
    }
    last_path_segment(url).filter(|s| s.chars().all(|c| c.is_ascii_digit()))
}

/// Variant rows from the first JSON-LD block that yields any.
pub fn extract(html: &str, url: &str, page_id: &str) -> Vec<ProductRecord> {
    let document = Html::parse_document(html);
    for block in jsonld::blocks(&document) {
        let Some(root) = jsonld::primary_node(&block) else {
            continue;
        };
        let mut records = jsonld::variant_records(root, page_id, |u| product_id(&clean_url(u)));
        // Rows without a name are never written.
        records.retain(|r| !r.name.is_empty());
        if !records.is_empty() {
            for r in &mut records {
                r.product_url = url.to_string();
            }
            return records;
        }
    }
    Vec::new()
}

#[async_trait]
impl SiteProfile for Walmart {
    fn key(&self) -> &'static str {
        "walmart"
    }

    fn display_name(&self) -> &'static str {
        "Walmart"
    }

    fn defaults(&self) -> SiteDefaults {
        SiteDefaults {
            base_url: "https://www.walmart.com",
            ..Default::default()
        }
    }

    fn url_filter(&self) -> UrlFilter {
        UrlFilter::including(&["/ip/"])
    }

    fn walk_options(&self, config: &ScrapeConfig) -> WalkOptions {
        let mut opts = WalkOptions::new(&config.base_url);
        opts.overrides = if config.sitemap_overrides.is_empty() {
            vec![format!("{}/sitemap_hi_ip.xml", opts.base_url)]
        } else {
            config.sitemap_overrides.clone()
        };
        opts
    }

    fn normalize_url(&self, url: &str) -> String {
        clean_url(url)
    }

    async fn scrape(&self, ctx: &ScrapeContext, url: &str) -> Result<Vec<ProductRecord>> {
        let page_id = product_id(url)
            .ok_or_else(|| HarvestError::Extraction("No product ID extracted".to_string()))?;
        let html = ctx.fetch_html(url).await?;
        let records = extract(&html, url, &page_id);
        if records.is_empty() {
            return Err(HarvestError::Extraction(
                "No product data extracted from JSON-LD".to_string(),
            ));
        }
        Ok(records)
    }
}
