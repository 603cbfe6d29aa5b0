//! Append-only logs of URLs that failed or were skipped.

use crate::error::Result;
use crate::extraction::scrape_timestamp;
use crate::output::open_append;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// `URL, Reason, Timestamp` rows for failed product URLs.
///
/// The file is created lazily so successful runs leave nothing behind.
pub struct FailureLog {
    path: PathBuf,
    writer: Mutex<Option<csv::Writer<File>>>,
}

impl FailureLog {
    pub const HEADER: [&'static str; 3] = ["URL", "Reason", "Timestamp"];

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(None),
        }
    }

    /// `{dir}/failure_csv/{site}_failures.csv`
    pub fn for_site(dir: &Path, site: &str) -> Self {
        Self::new(dir.join("failure_csv").join(format!("{site}_failures.csv")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, url: &str, reason: &str) -> Result<()> {
        let mut guard = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.is_none() {
            *guard = Some(open_append(&self.path, &Self::HEADER)?);
        }
        if let Some(w) = guard.as_mut() {
            let ts = scrape_timestamp();
            w.write_record([url, reason, ts.as_str()])?;
            w.flush()?;
        }
        Ok(())
    }
}

/// `URL, Reason, Timestamp, Sitemap Offset` rows for URLs skipped without a
/// fetch (listing pages and similar).
pub struct SkippedLog {
    path: PathBuf,
    offset: String,
    writer: Mutex<Option<csv::Writer<File>>>,
}

impl SkippedLog {
    pub const HEADER: [&'static str; 4] = ["URL", "Reason", "Timestamp", "Sitemap Offset"];

    /// `{dir}/skipped_plp_chunk_{offset}.csv`
    pub fn for_chunk(dir: &Path, offset: usize) -> Self {
        Self {
            path: dir.join(format!("skipped_plp_chunk_{offset}.csv")),
            offset: offset.to_string(),
            writer: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, url: &str, reason: &str) -> Result<()> {
        let mut guard = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.is_none() {
            *guard = Some(open_append(&self.path, &Self::HEADER)?);
        }
        if let Some(w) = guard.as_mut() {
            let ts = scrape_timestamp();
            w.write_record([url, reason, ts.as_str(), self.offset.as_str()])?;
            w.flush()?;
        }
        Ok(())
    }
}
