//! Chunk planner: counts a site's product URLs up front and splits them
//! into matrix jobs.
//!
//! Two layouts are supported. `Flat` materialises every URL into one list
//! file and slices it into fixed-size chunks. `PerSitemap` only counts
//! URLs and emits chunks addressed by sitemap URL plus offset, so each job
//! re-walks just its own sitemap.

use crate::cartography::url::UrlFilter;
use crate::cartography::walker::{no_sitemaps, window, SitemapWalker};
use crate::config::PlanConfig;
use crate::error::{HarvestError, Result};
use crate::output::write_url_list;
use crate::pipeline::chunk::{plan_flat, plan_per_sitemap, Chunk, SitemapCount};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PlanMode {
    Flat,
    PerSitemap,
}

impl PlanMode {
    /// Sitemap limit used when `MAX_SITEMAPS` is unset.
    pub fn default_max_sitemaps(self) -> usize {
        match self {
            PlanMode::Flat => 13,
            PlanMode::PerSitemap => 0,
        }
    }
}

/// What the planner produced.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub chunks: Vec<Chunk>,
    pub total_urls: usize,
    pub sitemaps: usize,
}

impl Plan {
    /// Extra `key=value` outputs published next to the matrix.
    pub fn outputs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("total_urls", self.total_urls.to_string()),
            ("chunk_count", self.chunks.len().to_string()),
        ]
    }
}

pub struct Planner<'a> {
    walker: &'a SitemapWalker,
    filter: UrlFilter,
    config: &'a PlanConfig,
}

impl<'a> Planner<'a> {
    pub fn new(walker: &'a SitemapWalker, filter: UrlFilter, config: &'a PlanConfig) -> Self {
        Self {
            walker,
            filter,
            config,
        }
    }

    pub async fn plan(&self, mode: PlanMode) -> Result<Plan> {
        info!(
            ?mode,
            max_sitemaps = self.config.max_sitemaps,
            max_urls_per_sitemap = self.config.max_urls_per_sitemap,
            chunk_size = self.config.chunk_size,
            urls_per_job = self.config.urls_per_job,
            workers = self.config.max_workers,
            "planner config"
        );
        let sitemaps = self.walker.resolve_sitemaps().await?;
        if sitemaps.is_empty() {
            return Err(no_sitemaps(&self.config.base_url));
        }
        let Some(selected) = window(&sitemaps, self.config.sitemap_offset, self.config.max_sitemaps)
        else {
            warn!(
                offset = self.config.sitemap_offset,
                total = sitemaps.len(),
                "sitemap offset exceeds total sitemaps, nothing to plan"
            );
            return Ok(Plan::default());
        };
        info!(count = selected.len(), "sitemaps selected");

        match mode {
            PlanMode::Flat => self.flat(selected).await,
            PlanMode::PerSitemap => self.per_sitemap(selected).await,
        }
    }

    /// Collect each sitemap's capped URL list, in sitemap order.
    async fn collect(&self, sitemaps: &[String], workers: usize) -> Vec<(String, Vec<String>)> {
        let cap = self.config.max_urls_per_sitemap;
        let total = sitemaps.len();
        stream::iter(sitemaps.iter().cloned().enumerate())
            .map(|(i, sm)| {
                let filter = &self.filter;
                async move {
                    let urls = match self.walker.collect_urls(&sm, filter, cap).await {
                        Ok(urls) => urls,
                        Err(e) => {
                            warn!(sitemap = %sm, "sitemap unavailable: {e}");
                            Vec::new()
                        }
                    };
                    info!(sitemap = %sm, urls = urls.len(), "sitemap {}/{} counted", i + 1, total);
                    (sm, urls)
                }
            })
            .buffered(workers.max(1))
            .collect()
            .await
    }

    async fn flat(&self, sitemaps: &[String]) -> Result<Plan> {
        let per_sitemap = self.collect(sitemaps, self.config.max_workers).await;
        let mut seen = HashSet::new();
        let unique: Vec<String> = per_sitemap
            .into_iter()
            .flat_map(|(_, urls)| urls)
            .filter(|u| seen.insert(u.clone()))
            .collect();
        info!(total = unique.len(), "total unique product urls");
        if unique.is_empty() {
            return Err(HarvestError::Sitemap("no product urls discovered".to_string()));
        }

        write_url_list(&self.config.url_file, &unique)?;
        let url_file = self.config.url_file.to_string_lossy();
        let chunks = plan_flat(unique.len(), self.config.chunk_size, &self.config.base_url, &url_file)?;
        info!(chunks = chunks.len(), file = %url_file, "flat plan ready");
        Ok(Plan {
            total_urls: unique.len(),
            sitemaps: sitemaps.len(),
            chunks,
        })
    }

    async fn per_sitemap(&self, sitemaps: &[String]) -> Result<Plan> {
        let counts: Vec<SitemapCount> = self
            .collect(sitemaps, self.config.max_workers)
            .await
            .into_iter()
            .map(|(url, urls)| SitemapCount {
                url,
                total_urls: urls.len(),
            })
            .collect();
        let total_urls = counts.iter().map(|c| c.total_urls).sum();
        let chunks = plan_per_sitemap(&counts, self.config.urls_per_job, &self.config.base_url)?;
        info!(chunks = chunks.len(), total_urls, "per-sitemap plan ready");
        Ok(Plan {
            chunks,
            total_urls,
            sitemaps: sitemaps.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::http_client::{HttpClient, RetryPolicy};
    use crate::acquisition::source::DirectSource;
    use crate::cartography::walker::WalkOptions;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serve(server: &MockServer, p: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    async fn site() -> MockServer {
        let server = MockServer::start().await;
        let base = server.uri();
        serve(&server, "/robots.txt", format!("Sitemap: {base}/sitemap_index.xml\n")).await;
        serve(
            &server,
            "/sitemap_index.xml",
            format!(
                "<sitemapindex><sitemap><loc>{base}/sm1.xml</loc></sitemap>\
                 <sitemap><loc>{base}/sm2.xml</loc></sitemap></sitemapindex>"
            ),
        )
        .await;
        let urls = |ids: &[u32]| {
            let items: String = ids
                .iter()
                .map(|i| format!("<url><loc>{base}/product/p{i}.html</loc></url>"))
                .collect();
            format!("<urlset>{items}</urlset>")
        };
        serve(&server, "/sm1.xml", urls(&[1, 2, 3])).await;
        serve(&server, "/sm2.xml", urls(&[3, 4])).await;
        server
    }

    fn walker(server: &MockServer) -> SitemapWalker {
        let http = HttpClient::new(Duration::from_secs(5), None, RetryPolicy::immediate(1)).unwrap();
        SitemapWalker::new(
            Arc::new(DirectSource::new(http)),
            WalkOptions::new(&server.uri()),
        )
    }

    fn config(server: &MockServer, dir: &std::path::Path, extra: &[(&str, &str)]) -> PlanConfig {
        let mut vars: Vec<(String, String)> = vec![
            ("CURR_URL".into(), server.uri()),
            ("URL_FILE".into(), dir.join("urls.csv").to_string_lossy().into_owned()),
        ];
        vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        PlanConfig::from_lookup(
            move |k| vars.iter().find(|(key, _)| key == k).map(|(_, v)| v.clone()),
            0,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_flat_plan_dedupes_and_writes_list() {
        let server = site().await;
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&server, dir.path(), &[("CHUNK_SIZE", "2")]);
        let w = walker(&server);
        let plan = Planner::new(&w, UrlFilter::including(&["/product/"]), &cfg)
            .plan(PlanMode::Flat)
            .await
            .unwrap();
        assert_eq!(plan.total_urls, 4);
        assert_eq!(plan.chunks.len(), 2);
        let listed = crate::output::read_url_list(&cfg.url_file).unwrap();
        assert_eq!(listed.len(), 4);
        assert!(listed[0].ends_with("/product/p1.html"));
    }

    #[tokio::test]
    async fn test_per_sitemap_plan() {
        let server = site().await;
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&server, dir.path(), &[("URLS_PER_JOB", "2")]);
        let w = walker(&server);
        let plan = Planner::new(&w, UrlFilter::including(&["/product/"]), &cfg)
            .plan(PlanMode::PerSitemap)
            .await
            .unwrap();
        // sm1: 3 urls -> 2 chunks, sm2: 2 urls -> 1 chunk
        assert_eq!(plan.chunks.len(), 3);
        assert_eq!(plan.total_urls, 5);
        assert!(plan.chunks[2].sitemap_url.as_deref().unwrap().ends_with("/sm2.xml"));
        assert!(!cfg.url_file.exists());
    }

    #[tokio::test]
    async fn test_offset_past_end_is_empty_plan() {
        let server = site().await;
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&server, dir.path(), &[("SITEMAP_OFFSET", "9")]);
        let w = walker(&server);
        let plan = Planner::new(&w, UrlFilter::default(), &cfg)
            .plan(PlanMode::PerSitemap)
            .await
            .unwrap();
        assert!(plan.chunks.is_empty());
    }
}
