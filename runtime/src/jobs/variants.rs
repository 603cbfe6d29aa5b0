//! BBB variant lookup: resolves Overstock/BBB option ids to model numbers,
//! dimensions and attributes through the public options API.
//!
//! The API times out and rate limits aggressively, so ids are processed
//! one at a time with a fixed pause between them.

use crate::acquisition::http_client::{HttpClient, RetryPolicy};
use crate::error::{HarvestError, Result};
use crate::extraction::json_text;
use crate::jobs::{file_timestamp, Table};
use crate::output::RunSummary;
use crate::pipeline::chunk::slice_for_job;
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_API_BASE: &str = "https://api.bedbathandbeyond.com";
pub const ID_COLUMN: &str = "Ref Varient ID";

/// Output columns, in the order they are written.
pub const BBB_COLUMNS: [&str; 10] = [
    "BBB_AttributeIcons_Count",
    "BBB_Attributes",
    "BBB_Attributes_Count",
    "BBB_Description",
    "BBB_Dimensions",
    "BBB_Error",
    "BBB_ModelNumber",
    "BBB_OptionId",
    "BBB_SKU",
    "BBB_Status",
];

const ALT_USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.107 Safari/537.36",
];

#[derive(Debug, Clone)]
pub struct VariantsOptions {
    pub chunk_id: usize,
    pub total_chunks: usize,
    pub input_file: PathBuf,
    pub output_dir: PathBuf,
    pub api_base: String,
    /// Public host tried last, with the client's plain headers.
    pub fallback_api_base: String,
    pub timeout: Duration,
    pub attempts: u32,
    /// Attempt `n` (0-based) failing waits `(n + 1) * retry_unit`.
    pub retry_unit: Duration,
    /// Pause between ids.
    pub id_delay: Duration,
    /// Pause between fallback strategies for one id.
    pub strategy_delay: Duration,
    pub rate_limit_wait: Duration,
}

impl VariantsOptions {
    pub fn new(chunk_id: usize, total_chunks: usize, input_file: PathBuf) -> Self {
        Self {
            chunk_id,
            total_chunks,
            input_file,
            output_dir: PathBuf::from("output"),
            api_base: DEFAULT_API_BASE.to_string(),
            fallback_api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
            attempts: 3,
            retry_unit: Duration::from_secs(5),
            id_delay: Duration::from_secs(2),
            strategy_delay: Duration::from_secs(1),
            rate_limit_wait: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantStatus {
    Success,
    Failed,
    Error,
}

impl VariantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VariantStatus::Success => "Success",
            VariantStatus::Failed => "Failed",
            VariantStatus::Error => "Error",
        }
    }
}

/// Lookup result for one id, keyed by `BBB_*` column.
#[derive(Debug, Clone)]
pub struct VariantResult {
    pub variant_id: String,
    pub status: VariantStatus,
    pub fields: HashMap<&'static str, String>,
}

impl VariantResult {
    fn failed(variant_id: &str, status: VariantStatus, error: &str) -> Self {
        let mut fields = HashMap::new();
        fields.insert("BBB_Error", error.to_string());
        fields.insert("BBB_Status", status.as_str().to_string());
        Self {
            variant_id: variant_id.to_string(),
            status,
            fields,
        }
    }

    pub fn get(&self, column: &str) -> &str {
        self.fields.get(column).map(String::as_str).unwrap_or("")
    }
}

/// `" 123.0 "` -> `"123"`.
pub fn clean_id(raw: &str) -> String {
    let id = raw.trim();
    id.strip_suffix(".0").unwrap_or(id).to_string()
}

pub fn is_valid_id(id: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+$").unwrap()).is_match(id)
}

/// First header that looks like it holds variant ids.
pub fn detect_id_column(headers: &[String]) -> Option<usize> {
    headers.iter().position(|h| {
        let h = h.to_lowercase();
        ["variant", "varient", "option", "id"]
            .iter()
            .any(|k| h.contains(k))
    })
}

/// Map an options API payload onto `BBB_*` fields. A payload with no
/// model number, option id or description is not an option record.
pub fn extract_fields(data: &Value) -> std::result::Result<HashMap<&'static str, String>, String> {
    if ["modelNumber", "optionId", "description"]
        .iter()
        .all(|k| json_text(data.get(*k)).is_empty())
    {
        return Err("Unexpected response: no option data".to_string());
    }

    let mut out = HashMap::new();
    let model = json_text(data.get("modelNumber"));
    out.insert("BBB_SKU", model.clone());
    out.insert("BBB_ModelNumber", model);
    out.insert("BBB_OptionId", json_text(data.get("optionId")));
    out.insert("BBB_Description", json_text(data.get("description")));

    let dims = data.get("assembledDimensions");
    let dim = |k: &str| json_text(dims.and_then(|d| d.get(k)));
    let (length, width, height) = (dim("length"), dim("width"), dim("height"));
    let dimensions = if !length.is_empty() && !width.is_empty() {
        let mut parts = vec![length, width];
        if !height.is_empty() {
            parts.push(height);
        }
        parts.join("x")
    } else {
        String::new()
    };
    out.insert("BBB_Dimensions", dimensions);

    let attributes = data
        .get("attributes")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let listed: Vec<String> = attributes
        .iter()
        .filter_map(|a| {
            let name = json_text(a.get("name"));
            let value = json_text(a.get("value"));
            (!name.is_empty() && !value.is_empty()).then(|| format!("{name}: {value}"))
        })
        .collect();
    out.insert("BBB_Attributes", listed.join(" | "));
    out.insert("BBB_Attributes_Count", attributes.len().to_string());

    let icons = data
        .get("attributeIcons")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    out.insert("BBB_AttributeIcons_Count", icons.to_string());
    out.insert("BBB_Error", String::new());
    out.insert("BBB_Status", VariantStatus::Success.as_str().to_string());
    Ok(out)
}

/// Options API client with the fallback strategy chain.
pub struct BbbClient {
    http: HttpClient,
    opts: VariantsOptions,
}

impl BbbClient {
    pub fn new(opts: VariantsOptions) -> Result<Self> {
        let http = HttpClient::new(
            opts.timeout,
            Some("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"),
            RetryPolicy::immediate(1),
        )?;
        Ok(Self { http, opts })
    }

    fn base(&self) -> &str {
        self.opts.api_base.trim_end_matches('/')
    }

    /// One GET. `Ok(None)` for any non-JSON or non-200 answer except 404,
    /// which is reported as `Err(())` so the caller stops that strategy.
    async fn try_url(&self, url: &str, headers: &[(String, String)]) -> std::result::Result<Option<Value>, ()> {
        debug!(url, "trying");
        match self.http.get_once(url, headers).await {
            Ok(r) if r.status == 200 => match r.json::<Value>() {
                Ok(v) if v.as_object().is_some_and(|o| !o.is_empty()) => Ok(Some(v)),
                _ => {
                    warn!(url, "invalid JSON");
                    Ok(None)
                }
            },
            Ok(r) if r.status == 404 => Err(()),
            Ok(r) if r.status == 429 => {
                warn!(url, "rate limited");
                tokio::time::sleep(self.opts.rate_limit_wait).await;
                Ok(None)
            }
            Ok(r) => {
                warn!(url, status = r.status, "unexpected status");
                Ok(None)
            }
            Err(e) => {
                warn!(url, "{}", e.reason());
                Ok(None)
            }
        }
    }

    async fn direct(&self, id: &str) -> Option<Value> {
        let base = self.base();
        let accept = vec![("Accept".to_string(), "application/json".to_string())];
        for path in ["options", "v1/options", "api/options", "product-api/options"] {
            match self.try_url(&format!("{base}/{path}/{id}"), &accept).await {
                Ok(Some(v)) => return Some(v),
                Ok(None) => continue,
                Err(()) => {
                    warn!(id, "variant not found (404)");
                    return None;
                }
            }
        }
        None
    }

    async fn alternate_headers(&self, id: &str) -> Option<Value> {
        let url = format!("{}/options/{id}", self.base());
        for ua in ALT_USER_AGENTS {
            let headers = vec![
                ("User-Agent".to_string(), ua.to_string()),
                ("Accept".to_string(), "application/json".to_string()),
                ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
                ("Referer".to_string(), "https://www.bedbathandbeyond.com/".to_string()),
                ("Origin".to_string(), "https://www.bedbathandbeyond.com".to_string()),
            ];
            if let Ok(Some(v)) = self.try_url(&url, &headers).await {
                info!(id, "success with alternative headers");
                return Some(v);
            }
        }
        None
    }

    async fn public_domain(&self, id: &str) -> Option<Value> {
        let domain = self.opts.fallback_api_base.trim_end_matches('/');
        let v = self
            .try_url(&format!("{domain}/options/{id}"), &[])
            .await
            .ok()
            .flatten()?;
        info!(id, domain, "success with alternative domain");
        Some(v)
    }

    /// Run the strategy chain once.
    pub async fn fetch(&self, id: &str) -> Option<Value> {
        if let Some(v) = self.direct(id).await {
            return Some(v);
        }
        tokio::time::sleep(self.opts.strategy_delay).await;
        if let Some(v) = self.alternate_headers(id).await {
            return Some(v);
        }
        tokio::time::sleep(self.opts.strategy_delay).await;
        self.public_domain(id).await
    }

    /// Look up one id with the configured attempts.
    pub async fn lookup(&self, id: &str) -> VariantResult {
        let attempts = self.opts.attempts.max(1);
        for attempt in 0..attempts {
            if let Some(data) = self.fetch(id).await {
                let fields = match extract_fields(&data) {
                    Ok(fields) => fields,
                    Err(msg) => {
                        warn!(id, "{msg}");
                        return VariantResult::failed(id, VariantStatus::Error, &msg);
                    }
                };
                info!(id, sku = %fields.get("BBB_SKU").map(String::as_str).unwrap_or("N/A"), "processed");
                return VariantResult {
                    variant_id: id.to_string(),
                    status: VariantStatus::Success,
                    fields,
                };
            }
            if attempt + 1 < attempts {
                let wait = self.opts.retry_unit * (attempt + 1);
                info!(id, "attempt {} failed, waiting {:?}", attempt + 1, wait);
                tokio::time::sleep(wait).await;
            }
        }
        warn!(id, "failed to fetch variant data");
        VariantResult::failed(id, VariantStatus::Failed, "API timeout or unavailable")
    }
}

/// Counters for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct VariantStats {
    pub total: usize,
    pub processed: usize,
    pub errors: usize,
    pub invalid: usize,
}

#[derive(Debug, Clone)]
pub struct VariantsReport {
    pub stats: VariantStats,
    pub output_file: PathBuf,
    pub summary_file: Option<PathBuf>,
}

pub async fn run(opts: VariantsOptions) -> Result<VariantsReport> {
    info!("{}", "=".repeat(60));
    info!("BBB variant lookup");
    info!("Chunk ID: {}/{}", opts.chunk_id, opts.total_chunks);
    info!("Input file: {}", opts.input_file.display());
    info!("API base: {}", opts.api_base);
    info!("{}", "=".repeat(60));

    std::fs::create_dir_all(&opts.output_dir)?;
    let table = Table::read(&opts.input_file)?;
    info!(rows = table.rows.len(), "loaded input");

    let id_col = detect_id_column(&table.headers).ok_or_else(|| {
        HarvestError::Config(format!(
            "could not find a variant id column in {:?}",
            table.headers
        ))
    })?;

    // Original columns plus the cleaned id column.
    let mut headers = table.headers.clone();
    let ref_col = match headers.iter().position(|h| h == ID_COLUMN) {
        Some(i) => i,
        None => {
            headers.push(ID_COLUMN.to_string());
            headers.len() - 1
        }
    };
    let mut valid: Vec<Vec<String>> = Vec::new();
    for row in &table.rows {
        let id = clean_id(row.get(id_col).map(String::as_str).unwrap_or(""));
        if !is_valid_id(&id) {
            continue;
        }
        let mut row = row.clone();
        row.resize(headers.len(), String::new());
        row[ref_col] = id;
        valid.push(row);
    }
    let invalid = table.rows.len() - valid.len();
    if invalid > 0 {
        warn!(invalid, "removed invalid variant ids");
    }

    if valid.is_empty() {
        warn!("no valid variant ids to process");
        let output_file = opts.output_dir.join(format!("bbb_chunk_{}.csv", opts.chunk_id));
        std::fs::write(&output_file, "")?;
        return Ok(VariantsReport {
            stats: VariantStats {
                invalid,
                ..Default::default()
            },
            output_file,
            summary_file: None,
        });
    }

    let range = slice_for_job(valid.len(), opts.chunk_id, opts.total_chunks);
    info!(
        "processing chunk {}: rows {}-{} ({} rows)",
        opts.chunk_id,
        range.start,
        range.end,
        range.len()
    );
    let chunk = &valid[range];

    let mut seen = HashSet::new();
    let ids: Vec<String> = chunk
        .iter()
        .map(|r| r[ref_col].clone())
        .filter(|id| seen.insert(id.clone()))
        .collect();
    info!(unique = ids.len(), "processing unique variant ids");

    let client = BbbClient::new(opts.clone())?;
    let mut stats = VariantStats {
        total: ids.len(),
        invalid,
        ..Default::default()
    };
    let mut results: HashMap<String, VariantResult> = HashMap::new();
    for (i, id) in ids.iter().enumerate() {
        info!("processing {}/{}: {}", i + 1, ids.len(), id);
        let result = client.lookup(id).await;
        match result.status {
            VariantStatus::Success => stats.processed += 1,
            _ => stats.errors += 1,
        }
        results.insert(id.clone(), result);
        if i + 1 < ids.len() && !opts.id_delay.is_zero() {
            tokio::time::sleep(opts.id_delay).await;
        }
    }

    let output_file = opts.output_dir.join(format!(
        "bbb_output_chunk_{}_{}.csv",
        opts.chunk_id,
        file_timestamp()
    ));
    write_output(&output_file, &headers, chunk, ref_col, &results)?;

    let summary = RunSummary::new("bbb_variants", opts.chunk_id)
        .detail("total_chunks", opts.total_chunks)
        .detail("input_file", opts.input_file.display().to_string())
        .detail("invalid", stats.invalid);
    let mut summary = summary.finish(stats.total, stats.processed, stats.errors);
    summary.output_file = Some(output_file.display().to_string());
    let summary_file = summary.write(&opts.output_dir)?;

    info!("{}", "=".repeat(60));
    info!("Total variants: {}", stats.total);
    info!("Successfully processed: {}", stats.processed);
    info!("Errors: {}", stats.errors);
    info!("Invalid IDs: {}", stats.invalid);
    info!("Success rate: {:.1}%", summary.success_rate);
    info!("Output file: {}", output_file.display());
    info!("{}", "=".repeat(60));

    Ok(VariantsReport {
        stats,
        output_file,
        summary_file: Some(summary_file),
    })
}

/// Input rows, each followed by the `BBB_*` fields of its id.
fn write_output(
    path: &Path,
    headers: &[String],
    rows: &[Vec<String>],
    ref_col: usize,
    results: &HashMap<String, VariantResult>,
) -> Result<()> {
    let mut w = csv::Writer::from_path(path)?;
    let header: Vec<&str> = headers
        .iter()
        .map(String::as_str)
        .chain(BBB_COLUMNS)
        .collect();
    w.write_record(&header)?;
    for row in rows {
        let result = results.get(&row[ref_col]);
        let record: Vec<&str> = row
            .iter()
            .map(String::as_str)
            .chain(BBB_COLUMNS.iter().map(|c| result.map_or("", |r| r.get(c))))
            .collect();
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}
