//! Run counters, shared by every worker.

use crate::output::summary::success_rate;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Live counters for one run.
pub struct RunStats {
    started: Instant,
    sitemaps_processed: AtomicUsize,
    urls_processed: AtomicUsize,
    products_saved: AtomicUsize,
    rows_written: AtomicUsize,
    errors: AtomicUsize,
    skipped: AtomicUsize,
    duplicates: AtomicUsize,
    /// Progress bar (None when quiet or not attached to a terminal)
    progress_bar: Option<ProgressBar>,
}

/// Point-in-time copy of [`RunStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub sitemaps_processed: usize,
    pub urls_processed: usize,
    pub products_saved: usize,
    pub rows_written: usize,
    pub errors: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub success_rate: f64,
    pub elapsed_ms: u64,
}

impl RunStats {
    pub fn new(show_progress: bool) -> Self {
        let progress_bar = show_progress.then(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {pos} urls {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb
        });
        Self {
            started: Instant::now(),
            sitemaps_processed: AtomicUsize::new(0),
            urls_processed: AtomicUsize::new(0),
            products_saved: AtomicUsize::new(0),
            rows_written: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            duplicates: AtomicUsize::new(0),
            progress_bar,
        }
    }

    pub fn sitemap_done(&self) {
        self.sitemaps_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// A product URL yielded `rows` rows.
    pub fn saved(&self, rows: usize) {
        self.products_saved.fetch_add(1, Ordering::Relaxed);
        self.rows_written.fetch_add(rows, Ordering::Relaxed);
        self.tick();
    }

    pub fn failed(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.tick();
    }

    pub fn skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    fn tick(&self) {
        let processed = self.urls_processed.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(ref pb) = self.progress_bar {
            pb.set_position(processed as u64);
            pb.set_message(format!(
                "| {} saved | {} errors",
                self.products_saved.load(Ordering::Relaxed),
                self.errors.load(Ordering::Relaxed)
            ));
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let processed = self.urls_processed.load(Ordering::Relaxed);
        let saved = self.products_saved.load(Ordering::Relaxed);
        StatsSnapshot {
            sitemaps_processed: self.sitemaps_processed.load(Ordering::Relaxed),
            urls_processed: processed,
            products_saved: saved,
            rows_written: self.rows_written.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            success_rate: success_rate(saved, processed),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    /// Finish the progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            let s = self.snapshot();
            pb.finish_with_message(format!(
                "done: {} saved, {} errors, {} skipped",
                s.products_saved, s.errors, s.skipped
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_rate() {
        let stats = RunStats::new(false);
        stats.saved(3);
        stats.saved(1);
        stats.failed();
        stats.skipped();
        stats.duplicate();
        stats.sitemap_done();

        let s = stats.snapshot();
        assert_eq!(s.urls_processed, 3);
        assert_eq!(s.products_saved, 2);
        assert_eq!(s.rows_written, 4);
        assert_eq!(s.errors, 1);
        assert_eq!(s.skipped, 1);
        assert_eq!(s.duplicates, 1);
        assert_eq!(s.sitemaps_processed, 1);
        assert_eq!(s.success_rate, 66.67);
    }
}
