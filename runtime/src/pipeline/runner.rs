//! The scrape loop shared by every site.
//!
//! A run resolves its work (a sitemap window or a URL list file), then
//! pushes each batch of product URLs through the profile with at most
//! `max_workers` requests in flight. Per-URL failures are logged and
//! counted, never propagated.

use crate::cartography::walker::{no_sitemaps, window, SitemapWalker};
use crate::error::{HarvestError, Result};
use crate::events::{now_timestamp, EventBus, HarvestEvent};
use crate::extraction::scrape_timestamp;
use crate::output::{read_url_list, CsvSink, FailureLog, RunSummary, SkippedLog};
use crate::pipeline::stats::{RunStats, StatsSnapshot};
use crate::sites::{ScrapeContext, SiteProfile};
use dashmap::DashSet;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub site: String,
    pub sitemaps_found: usize,
    pub stats: StatsSnapshot,
    pub output_file: PathBuf,
    pub failure_file: PathBuf,
}

pub struct Pipeline {
    profile: Arc<dyn SiteProfile>,
    ctx: ScrapeContext,
    events: EventBus,
    show_progress: bool,
}

/// Shared state of one run.
struct RunState {
    sink: CsvSink,
    failures: FailureLog,
    skipped: SkippedLog,
    stats: RunStats,
    seen: DashSet<String>,
}

/// Failure-log text for a scrape error.
pub fn failure_reason(err: &HarvestError) -> String {
    match err {
        HarvestError::Http { .. }
        | HarvestError::Status { .. }
        | HarvestError::TargetStatus { .. }
        | HarvestError::FlareSolverr(_) => {
            format!("HTTP fetch failed ({})", err.reason())
        }
        other => other.reason(),
    }
}

impl Pipeline {
    pub fn new(profile: Arc<dyn SiteProfile>, ctx: ScrapeContext, events: EventBus) -> Self {
        Self {
            profile,
            ctx,
            events,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Offset that names this run's output files.
    fn chunk_offset(&self) -> usize {
        let config = &self.ctx.config;
        if config.url_file.is_some() {
            config.url_offset
        } else {
            config.sitemap_offset
        }
    }

    pub async fn run(&self) -> Result<RunReport> {
        let config = Arc::clone(&self.ctx.config);
        let site = self.profile.key();
        let offset = self.chunk_offset();

        info!(
            site,
            base_url = %config.base_url,
            transport = self.ctx.source.name(),
            sitemap_offset = config.sitemap_offset,
            max_sitemaps = config.max_sitemaps,
            max_urls_per_sitemap = config.max_urls_per_sitemap,
            workers = config.max_workers,
            delay = ?config.request_delay,
            "starting {} scrape",
            self.profile.display_name()
        );
        self.events.emit(HarvestEvent::RunStarted {
            site: site.to_string(),
            base_url: config.base_url.clone(),
            timestamp: now_timestamp(),
        });

        if !config.cold_start_delay.is_zero() {
            info!(delay = ?config.cold_start_delay, "cold start delay");
            tokio::time::sleep(config.cold_start_delay).await;
        }

        let state = RunState {
            sink: CsvSink::create(
                CsvSink::chunk_path(&config.output_dir, site, offset),
                self.profile.columns(),
            )?,
            failures: FailureLog::for_site(&config.output_dir, site),
            skipped: SkippedLog::for_chunk(&config.output_dir, offset),
            stats: RunStats::new(self.show_progress),
            seen: DashSet::new(),
        };

        let sitemaps_found = match &config.url_file {
            Some(path) => {
                let all = read_url_list(path)?;
                let urls = window(&all, config.url_offset, config.url_limit)
                    .map(<[String]>::to_vec)
                    .unwrap_or_default();
                info!(
                    file = %path.display(),
                    total = all.len(),
                    selected = urls.len(),
                    "processing URL list"
                );
                self.process_batch(urls, &state).await;
                0
            }
            None => self.walk(&state).await?,
        };

        state.stats.finish();
        let stats = state.stats.snapshot();
        self.events.emit(HarvestEvent::RunComplete {
            site: site.to_string(),
            urls_processed: stats.urls_processed,
            products_saved: stats.products_saved,
            errors: stats.errors,
            skipped: stats.skipped,
            elapsed_ms: stats.elapsed_ms,
        });

        info!("{}", "=".repeat(60));
        info!("SCRAPING COMPLETE");
        info!("Sitemaps processed: {}", stats.sitemaps_processed);
        info!("URLs processed:     {}", stats.urls_processed);
        info!("Products saved:     {}", stats.products_saved);
        info!("Errors:             {}", stats.errors);
        info!("Skipped:            {}", stats.skipped);
        info!("Success rate:       {:.2}%", stats.success_rate);
        info!("Output file:        {}", state.sink.path().display());
        info!("{}", "=".repeat(60));

        let summary = RunSummary::new(site, format!("{site}_{offset}"))
            .detail("sitemaps_processed", stats.sitemaps_processed)
            .detail("rows_written", stats.rows_written)
            .detail("duplicates", stats.duplicates);
        let mut summary = summary.finish(stats.urls_processed, stats.products_saved, stats.errors);
        summary.skipped = stats.skipped;
        summary.output_file = Some(state.sink.path().display().to_string());
        if let Err(e) = summary.write(&config.output_dir) {
            warn!("could not write run summary: {e}");
        }

        Ok(RunReport {
            site: site.to_string(),
            sitemaps_found,
            stats,
            output_file: state.sink.path().to_path_buf(),
            failure_file: state.failures.path().to_path_buf(),
        })
    }

    /// Sitemap mode. Returns the number of sitemaps discovered.
    async fn walk(&self, state: &RunState) -> Result<usize> {
        let config = &self.ctx.config;
        let walker = SitemapWalker::new(
            Arc::clone(&self.ctx.source),
            self.profile.walk_options(config),
        );
        let sitemaps = walker.resolve_sitemaps().await?;
        if sitemaps.is_empty() {
            return Err(no_sitemaps(&config.base_url));
        }
        let Some(selected) = window(&sitemaps, config.sitemap_offset, config.max_sitemaps) else {
            warn!(
                offset = config.sitemap_offset,
                total = sitemaps.len(),
                "sitemap offset exceeds total sitemaps, nothing to do"
            );
            return Ok(sitemaps.len());
        };
        info!(
            "processing sitemaps {} to {} of {}",
            config.sitemap_offset,
            config.sitemap_offset + selected.len(),
            sitemaps.len()
        );

        let filter = self.profile.url_filter();
        let site = self.profile.key();
        for (i, sitemap) in selected.iter().enumerate() {
            info!("processing sitemap {}/{}: {}", i + 1, selected.len(), sitemap);
            self.events.emit(HarvestEvent::SitemapStarted {
                site: site.to_string(),
                sitemap: sitemap.clone(),
                index: config.sitemap_offset + i,
                total: sitemaps.len(),
            });

            let urls = match walker
                .collect_urls(sitemap, &filter, config.max_urls_per_sitemap)
                .await
            {
                Ok(urls) => urls,
                Err(e) => {
                    error!(sitemap = %sitemap, "failed to load sitemap: {e}");
                    continue;
                }
            };
            let urls = if config.url_offset > 0 || config.url_limit > 0 {
                window(&urls, config.url_offset, config.url_limit)
                    .map(<[String]>::to_vec)
                    .unwrap_or_default()
            } else {
                urls
            };
            info!(sitemap = %sitemap, urls = urls.len(), "product urls collected");

            let before = state.stats.snapshot().products_saved;
            let count = urls.len();
            self.process_batch(urls, state).await;
            state.stats.sitemap_done();
            self.events.emit(HarvestEvent::SitemapFinished {
                site: site.to_string(),
                sitemap: sitemap.clone(),
                urls: count,
                saved: state.stats.snapshot().products_saved - before,
            });
        }
        Ok(sitemaps.len())
    }

    async fn process_batch(&self, urls: Vec<String>, state: &RunState) {
        stream::iter(urls)
            .map(|url| self.process_url(url, state))
            .buffer_unordered(self.ctx.config.max_workers.max(1))
            .for_each(|_| async {})
            .await;
    }

    async fn process_url(&self, raw: String, state: &RunState) {
        let site = self.profile.key();

        if let Some(reason) = self.profile.skip_reason(&raw) {
            debug!(url = %raw, reason, "skipping");
            state.stats.skipped();
            if let Err(e) = state.skipped.record(&raw, reason) {
                warn!("could not log skipped url: {e}");
            }
            return;
        }

        let url = self.profile.normalize_url(&raw);
        if !state.seen.insert(url.clone()) {
            state.stats.duplicate();
            return;
        }

        let outcome = match self.profile.scrape(&self.ctx, &url).await {
            Ok(records) if records.is_empty() => {
                Err("No product data extracted".to_string())
            }
            Ok(mut records) => {
                let ts = scrape_timestamp();
                for r in &mut records {
                    if r.scraped_date.is_empty() {
                        r.scraped_date = ts.clone();
                    }
                }
                state
                    .sink
                    .write_all(&records)
                    .map_err(|e| format!("Write failed: {e}"))
            }
            Err(e) => Err(failure_reason(&e)),
        };

        match outcome {
            Ok(rows) => {
                debug!(url = %url, rows, "saved");
                state.stats.saved(rows);
                self.events.emit(HarvestEvent::ProductSaved {
                    site: site.to_string(),
                    url: url.clone(),
                    rows,
                });
            }
            Err(reason) => {
                warn!(url = %url, "{reason}");
                state.stats.failed();
                if let Err(e) = state.failures.record(&url, &reason) {
                    error!("could not log failure: {e}");
                }
                self.events.emit(HarvestEvent::UrlFailed {
                    site: site.to_string(),
                    url: url.clone(),
                    reason,
                });
            }
        }

        let delay = self.ctx.config.request_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason() {
        let status = HarvestError::Status {
            url: "https://x".to_string(),
            status: 403,
        };
        assert_eq!(failure_reason(&status), "HTTP fetch failed (http_403)");
        assert_eq!(
            failure_reason(&HarvestError::Extraction("No product ID extracted".to_string())),
            "No product ID extracted"
        );
        assert_eq!(failure_reason(&HarvestError::Captcha("https://x".to_string())), "captcha");
    }
}
