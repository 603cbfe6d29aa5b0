//! Cymax: Cloudflare-fronted, so every fetch goes through FlareSolverr.

use crate::cartography::url::{clean_url, UrlFilter};
use crate::config::{SiteDefaults, Transport};
use crate::error::{HarvestError, Result};
use crate::extraction::ProductRecord;
use crate::sites::{generic, ScrapeContext, SiteProfile};
use async_trait::async_trait;

pub struct Cymax;

/// Numeric id from `name--123456.htm`.
pub fn product_id(url: &str) -> Option<String> {
    let stem = clean_url(url);
    let stem = stem.strip_suffix(".htm")?;
    let (_, id) = stem.rsplit_once("--")?;
    (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit())).then(|| id.to_string())
}

#[async_trait]
impl SiteProfile for Cymax {
    fn key(&self) -> &'static str {
        "cymax"
    }

    fn display_name(&self) -> &'static str {
        "Cymax"
    }

    fn defaults(&self) -> SiteDefaults {
        SiteDefaults {
            base_url: "https://www.cymax.com",
            transport: Transport::FlareSolverr,
            ..Default::default()
        }
    }

    fn url_filter(&self) -> UrlFilter {
        UrlFilter::default()
            .with_suffix(&[".htm"])
            .excluding(&["--C", "--PC", "sitemap", "robots"])
    }

    fn normalize_url(&self, url: &str) -> String {
        clean_url(url)
    }

    async fn scrape(&self, ctx: &ScrapeContext, url: &str) -> Result<Vec<ProductRecord>> {
        let html = ctx.fetch_html(url).await?;
        let mut records = generic::extract(&html, url, ctx.base_url());
        if records.is_empty() {
            return Err(HarvestError::Extraction("No product data found in JSON-LD".to_string()));
        }
        let id = product_id(url).unwrap_or_default();
        for r in &mut records {
            if r.product_id.is_empty() {
                r.product_id = id.clone();
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_id() {
        assert_eq!(
            product_id("https://www.cymax.com/modern-sofa--123456.htm").as_deref(),
            Some("123456")
        );
        assert_eq!(product_id("https://www.cymax.com/sofas--C12.htm"), None);
        assert_eq!(product_id("https://www.cymax.com/about"), None);
    }

    #[test]
    fn test_defaults_use_flaresolverr() {
        assert_eq!(Cymax.defaults().transport, Transport::FlareSolverr);
        assert!(Cymax.url_filter().accepts("https://www.cymax.com/desk--998.htm"));
    }
}
