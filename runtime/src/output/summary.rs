//! JSON run summaries written next to the CSV outputs.

use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub job: String,
    pub chunk_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub success_rate: f64,
    pub output_file: Option<String>,
    /// Job-specific counters.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl RunSummary {
    pub fn new(job: &str, chunk_id: impl ToString) -> Self {
        Self {
            job: job.to_string(),
            chunk_id: chunk_id.to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            ..Default::default()
        }
    }

    pub fn detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Close the summary: stamp the end time and compute the success rate.
    pub fn finish(mut self, total: usize, succeeded: usize, failed: usize) -> Self {
        self.total = total;
        self.succeeded = succeeded;
        self.failed = failed;
        self.success_rate = success_rate(succeeded, total);
        self.finished_at = chrono::Utc::now().to_rfc3339();
        self
    }

    /// `{dir}/summary_{chunk_id}.json`
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("summary_{}.json", self.chunk_id));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

/// Percentage of `part` in `whole`, rounded to two decimals. Zero when
/// `whole` is zero.
pub fn success_rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 10_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        assert_eq!(success_rate(0, 0), 0.0);
        assert_eq!(success_rate(1, 3), 33.33);
        assert_eq!(success_rate(4, 4), 100.0);
    }

    #[test]
    fn test_write_summary() {
        let dir = tempfile::tempdir().unwrap();
        let summary = RunSummary::new("variants", 2)
            .detail("invalid_ids", 3)
            .finish(10, 8, 2);
        let path = summary.write(dir.path()).unwrap();
        assert!(path.ends_with("summary_2.json"));
        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(v["succeeded"], 8);
        assert_eq!(v["success_rate"], 80.0);
        assert_eq!(v["details"]["invalid_ids"], 3);
    }
}
