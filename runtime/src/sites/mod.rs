//! Site profiles: everything that differs between retailers.
//!
//! The pipeline owns sitemap traversal, concurrency, dedupe and output. A
//! profile only says where a site's sitemaps live, which URLs are products,
//! and how to turn one product URL into rows.

pub mod bisonoffice;
pub mod bloomingdales;
pub mod cymax;
pub mod emmamason;
pub mod furniturepick;
pub mod generic;
pub mod luxedecor;
pub mod walmart;

use crate::acquisition::captcha;
use crate::acquisition::flaresolverr::FlareSolverrClient;
use crate::acquisition::http_client::{HttpClient, RetryPolicy};
use crate::acquisition::source::{DirectSource, FallbackSource, PageSource, SolverSource};
use crate::cartography::url::UrlFilter;
use crate::cartography::walker::WalkOptions;
use crate::config::{ScrapeConfig, SiteDefaults, Transport};
use crate::error::{HarvestError, Result};
use crate::extraction::{Columns, ProductRecord, STANDARD_COLUMNS};
use async_trait::async_trait;
use std::sync::Arc;

/// Shared handles a profile scrapes with.
#[derive(Clone)]
pub struct ScrapeContext {
    pub config: Arc<ScrapeConfig>,
    /// Direct client for JSON APIs.
    pub http: HttpClient,
    /// Transport for HTML pages and sitemaps.
    pub source: Arc<dyn PageSource>,
}

impl ScrapeContext {
    /// Build the clients a run needs from its configuration.
    pub fn build(config: ScrapeConfig, profile: &dyn SiteProfile) -> Result<Self> {
        let policy = RetryPolicy::default().with_attempts(config.max_attempts);
        let http = HttpClient::with_headers(
            config.request_timeout,
            config.user_agent.as_deref(),
            policy,
            profile.extra_headers(),
        )?
        .with_base_url(&config.base_url);

        let source: Arc<dyn PageSource> = match config.transport {
            Transport::Direct => Arc::new(DirectSource::new(http.clone())),
            Transport::FlareSolverr => Arc::new(SolverSource::new(solver(&config)?)),
            Transport::DirectWithFallback => {
                Arc::new(FallbackSource::new(http.clone(), solver(&config)?))
            }
        };

        Ok(Self {
            config: Arc::new(config),
            http,
            source,
        })
    }

    /// Fetch a product page as text. Challenge pages are errors.
    pub async fn fetch_html(&self, url: &str) -> Result<String> {
        let page = self.source.fetch_page(url).await?;
        let html = page.text();
        if captcha::is_captcha_page(&html, &page.final_url) {
            return Err(HarvestError::Captcha(url.to_string()));
        }
        Ok(html)
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// The API root, required by API-backed profiles.
    pub fn api_base(&self) -> Result<&str> {
        self.config
            .api_base_url
            .as_deref()
            .map(|s| s.trim_end_matches('/'))
            .ok_or_else(|| HarvestError::Config("API_BASE_URL is required".to_string()))
    }
}

fn solver(config: &ScrapeConfig) -> Result<Arc<FlareSolverrClient>> {
    let endpoint = config
        .flaresolverr_url
        .as_deref()
        .ok_or_else(|| HarvestError::Config("FLARESOLVERR_URL is required".to_string()))?;
    Ok(Arc::new(FlareSolverrClient::new(
        endpoint,
        config.flaresolverr_timeout,
    )?))
}

/// A retailer.
#[async_trait]
pub trait SiteProfile: Send + Sync {
    /// Registry key, also used in output file names.
    fn key(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    fn defaults(&self) -> SiteDefaults;

    fn columns(&self) -> Columns {
        STANDARD_COLUMNS
    }

    /// Which sitemap locs are product pages.
    fn url_filter(&self) -> UrlFilter;

    /// Sitemap discovery for this site. Explicit overrides always win.
    fn walk_options(&self, config: &ScrapeConfig) -> WalkOptions {
        let mut opts = WalkOptions::new(&config.base_url);
        opts.overrides = config.sitemap_overrides.clone();
        opts
    }

    /// Headers sent on every request to this site.
    fn extra_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Canonical form used for dedupe and fetching.
    fn normalize_url(&self, url: &str) -> String {
        url.to_string()
    }

    /// Reason to skip a URL without fetching it, if any.
    fn skip_reason(&self, _url: &str) -> Option<&'static str> {
        None
    }

    /// Fetch and extract one product URL. An empty result is a failure.
    async fn scrape(&self, ctx: &ScrapeContext, url: &str) -> Result<Vec<ProductRecord>>;
}

/// Every registered profile.
pub fn all() -> Vec<Arc<dyn SiteProfile>> {
    vec![
        Arc::new(walmart::Walmart),
        Arc::new(emmamason::EmmaMason),
        Arc::new(bisonoffice::BisonOffice),
        Arc::new(luxedecor::LuxeDecor),
        Arc::new(bloomingdales::Bloomingdales),
        Arc::new(furniturepick::FurniturePick),
        Arc::new(cymax::Cymax),
        Arc::new(generic::Generic),
    ]
}

/// Find a profile by key (case-insensitive).
pub fn lookup(key: &str) -> Result<Arc<dyn SiteProfile>> {
    all()
        .into_iter()
        .find(|p| p.key().eq_ignore_ascii_case(key))
        .ok_or_else(|| HarvestError::UnknownSite(key.to_string()))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::time::Duration;

    /// A context pointed at a mock server, with no retry delays.
    pub fn context(base: &str, api: Option<String>) -> ScrapeContext {
        let config = ScrapeConfig::from_lookup(|_| None, &SiteDefaults::default())
            .unwrap()
            .apply(crate::config::ScrapeOverrides {
                base_url: Some(base.to_string()),
                api_base_url: api,
                ..Default::default()
            })
            .unwrap();
        let http = HttpClient::new(Duration::from_secs(5), None, RetryPolicy::immediate(1))
            .unwrap()
            .with_base_url(base);
        ScrapeContext {
            config: Arc::new(config),
            source: Arc::new(DirectSource::new(http.clone())),
            http,
        }
    }
}
