//! `harvest scrape <site>`: run the sitemap pipeline for one retailer.

use crate::cli::output::{self, Styled};
use crate::config::{ScrapeConfig, ScrapeOverrides, Transport};
use crate::events::EventBus;
use crate::pipeline::Pipeline;
use crate::sites::{self, ScrapeContext};
use anyhow::Result;
use std::path::PathBuf;

/// Flags that override the environment for a scrape run.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ScrapeArgs {
    /// Site root (overrides CURR_URL)
    #[arg(long)]
    pub base_url: Option<String>,
    /// Product API root (overrides API_BASE_URL)
    #[arg(long)]
    pub api_base_url: Option<String>,
    /// First sitemap to process (overrides SITEMAP_OFFSET)
    #[arg(long)]
    pub sitemap_offset: Option<usize>,
    /// Sitemaps to process, 0 for all (overrides MAX_SITEMAPS)
    #[arg(long)]
    pub max_sitemaps: Option<usize>,
    /// URLs per sitemap, 0 for all (overrides MAX_URLS_PER_SITEMAP)
    #[arg(long)]
    pub max_urls_per_sitemap: Option<usize>,
    /// Concurrent requests (overrides MAX_WORKERS)
    #[arg(long)]
    pub workers: Option<usize>,
    /// Seconds to wait after each product (overrides REQUEST_DELAY)
    #[arg(long)]
    pub delay: Option<f64>,
    /// Explicit sitemap URL; repeat for several (overrides SITEMAP_URLS_OVERRIDE)
    #[arg(long = "sitemap")]
    pub sitemaps: Vec<String>,
    /// FlareSolverr endpoint (overrides FLARESOLVERR_URL)
    #[arg(long)]
    pub flaresolverr_url: Option<String>,
    /// Output directory (overrides OUTPUT_DIR)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    /// Read product URLs from this CSV instead of walking sitemaps
    #[arg(long)]
    pub url_file: Option<PathBuf>,
    /// First URL to process (overrides URL_OFFSET)
    #[arg(long)]
    pub url_offset: Option<usize>,
    /// URLs to process, 0 for all (overrides URL_LIMIT)
    #[arg(long)]
    pub url_limit: Option<usize>,
    /// Disable the progress spinner
    #[arg(long)]
    pub no_progress: bool,
}

impl ScrapeArgs {
    pub fn overrides(&self) -> ScrapeOverrides {
        ScrapeOverrides {
            base_url: self.base_url.clone(),
            api_base_url: self.api_base_url.clone(),
            sitemap_offset: self.sitemap_offset,
            max_sitemaps: self.max_sitemaps,
            max_urls_per_sitemap: self.max_urls_per_sitemap,
            max_workers: self.workers,
            request_delay: self.delay,
            sitemaps: self.sitemaps.clone(),
            flaresolverr_url: self.flaresolverr_url.clone(),
            output_dir: self.output_dir.clone(),
            url_file: self.url_file.clone(),
            url_offset: self.url_offset,
            url_limit: self.url_limit,
        }
    }
}

/// A configured FlareSolverr endpoint turns a direct site into
/// direct-with-fallback.
pub fn prefer_fallback(config: &mut ScrapeConfig) {
    if config.transport == Transport::Direct && config.flaresolverr_url.is_some() {
        config.transport = Transport::DirectWithFallback;
    }
}

pub async fn run(site: &str, args: &ScrapeArgs) -> Result<()> {
    let profile = sites::lookup(site)?;
    let mut config = ScrapeConfig::from_env(&profile.defaults())?.apply(args.overrides())?;
    prefer_fallback(&mut config);

    let ctx = ScrapeContext::build(config, profile.as_ref())?;
    let show_progress = !args.no_progress && !output::is_quiet() && !output::is_json();
    let report = Pipeline::new(profile, ctx, EventBus::default())
        .with_progress(show_progress)
        .run()
        .await?;

    if output::is_json() {
        output::print_json(&serde_json::to_value(&report)?);
        return Ok(());
    }
    if !output::is_quiet() {
        let s = Styled::new();
        let stats = &report.stats;
        println!();
        println!("  {} {} scrape complete", s.ok_sym(), s.bold(&report.site));
        println!("  Sitemaps found:  {}", report.sitemaps_found);
        println!("  URLs processed:  {}", stats.urls_processed);
        println!("  Products saved:  {}", stats.products_saved);
        println!("  Rows written:    {}", stats.rows_written);
        println!("  Errors:          {}", stats.errors);
        println!("  Skipped:         {}", stats.skipped);
        println!("  Success rate:    {:.2}%", stats.success_rate);
        println!("  Output:          {}", report.output_file.display());
        if stats.errors > 0 {
            println!("  Failures:        {}", report.failure_file.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteDefaults;

    #[test]
    fn test_overrides_map_flags() {
        let args = ScrapeArgs {
            workers: Some(8),
            sitemaps: vec!["https://a/s.xml".to_string()],
            ..Default::default()
        };
        let o = args.overrides();
        assert_eq!(o.max_workers, Some(8));
        assert_eq!(o.sitemaps.len(), 1);
        assert!(o.base_url.is_none());
    }

    #[test]
    fn test_prefer_fallback() {
        let lookup = |k: &str| match k {
            "CURR_URL" => Some("https://shop.example".to_string()),
            "FLARESOLVERR_URL" => Some("http://fs:8191/v1".to_string()),
            _ => None,
        };
        let mut config = ScrapeConfig::from_lookup(lookup, &SiteDefaults::default()).unwrap();
        prefer_fallback(&mut config);
        assert_eq!(config.transport, Transport::DirectWithFallback);
    }
}
