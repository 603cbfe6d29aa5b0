//! Chunk planning for CI matrix fan-out.

use crate::error::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// One matrix entry: a slice of work for a single job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: usize,
    pub offset: usize,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_urls: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sitemap_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_file: Option<String>,
    pub base_url: String,
}

/// URL count of one sitemap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SitemapCount {
    pub url: String,
    pub total_urls: usize,
}

/// Contiguous `chunk_size` slices over `total` URLs; the last may be short.
pub fn plan_flat(total: usize, chunk_size: usize, base_url: &str, url_file: &str) -> Result<Vec<Chunk>> {
    if chunk_size == 0 {
        return Err(HarvestError::Config("CHUNK_SIZE must be > 0".to_string()));
    }
    Ok((0..total)
        .step_by(chunk_size)
        .enumerate()
        .map(|(chunk_id, offset)| Chunk {
            chunk_id,
            offset,
            limit: chunk_size.min(total - offset),
            total_urls: Some(total),
            sitemap_url: None,
            url_file: Some(url_file.to_string()),
            base_url: base_url.to_string(),
        })
        .collect())
}

/// `ceil(total / urls_per_job)` chunks per sitemap, numbered globally.
/// Empty sitemaps produce nothing.
pub fn plan_per_sitemap(stats: &[SitemapCount], urls_per_job: usize, base_url: &str) -> Result<Vec<Chunk>> {
    if urls_per_job == 0 {
        return Err(HarvestError::Config("URLS_PER_JOB must be > 0".to_string()));
    }
    let mut chunks = Vec::new();
    for sm in stats.iter().filter(|s| s.total_urls > 0) {
        for offset in (0..sm.total_urls).step_by(urls_per_job) {
            chunks.push(Chunk {
                chunk_id: chunks.len(),
                offset,
                limit: urls_per_job.min(sm.total_urls - offset),
                total_urls: None,
                sitemap_url: Some(sm.url.clone()),
                url_file: None,
                base_url: base_url.to_string(),
            });
        }
    }
    Ok(chunks)
}

/// Index range of chunk `chunk_id` (1-based) when `len` items are split
/// into `total_chunks` jobs. The last chunk absorbs the remainder.
pub fn slice_for_job(len: usize, chunk_id: usize, total_chunks: usize) -> std::ops::Range<usize> {
    if total_chunks <= 1 {
        return 0..len;
    }
    let size = (len / total_chunks).max(1);
    let idx = chunk_id.max(1) - 1;
    let start = (idx * size).min(len);
    let end = if chunk_id >= total_chunks {
        len
    } else {
        (start + size).min(len)
    };
    start..end
}

/// Publish the matrix: appended to `$GITHUB_OUTPUT` when set, else printed.
pub fn write_matrix(chunks: &[Chunk], extra: &[(&str, String)], github_output: Option<&Path>) -> Result<()> {
    let matrix = serde_json::to_string(chunks)?;
    match github_output {
        Some(path) => {
            let mut f = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            writeln!(f, "matrix={matrix}")?;
            for (key, value) in extra {
                writeln!(f, "{key}={value}")?;
            }
        }
        None => println!("{matrix}"),
    }
    Ok(())
}
