//! Run configuration resolved from CLI flags, environment and site defaults.
//!
//! Priority order: explicit CLI value > environment variable > site profile
//! default > built-in default. A value of `0` for the sitemap, per-sitemap
//! and URL limits means "no limit".

use crate::error::{HarvestError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How a site's pages are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Plain HTTP with browser-like headers.
    Direct,
    /// Every request goes through FlareSolverr.
    FlareSolverr,
    /// Plain HTTP first, FlareSolverr on 403/503.
    DirectWithFallback,
}

/// Per-site defaults that sit below env vars and CLI flags.
#[derive(Debug, Clone)]
pub struct SiteDefaults {
    pub base_url: &'static str,
    pub api_base_url: Option<&'static str>,
    pub request_delay_secs: f64,
    pub max_attempts: u32,
    pub transport: Transport,
}

impl Default for SiteDefaults {
    fn default() -> Self {
        Self {
            base_url: "",
            api_base_url: None,
            request_delay_secs: 1.0,
            max_attempts: 3,
            transport: Transport::Direct,
        }
    }
}

/// Configuration for one scrape run.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub base_url: String,
    pub api_base_url: Option<String>,
    pub sitemap_offset: usize,
    pub max_sitemaps: usize,
    pub max_urls_per_sitemap: usize,
    pub max_workers: usize,
    pub request_delay: Duration,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub sitemap_overrides: Vec<String>,
    pub user_agent: Option<String>,
    pub cold_start_delay: Duration,
    pub transport: Transport,
    pub flaresolverr_url: Option<String>,
    pub flaresolverr_timeout: Duration,
    pub output_dir: PathBuf,
    pub url_file: Option<PathBuf>,
    pub url_offset: usize,
    pub url_limit: usize,
}

/// CLI-supplied values that win over the environment.
#[derive(Debug, Clone, Default)]
pub struct ScrapeOverrides {
    pub base_url: Option<String>,
    pub api_base_url: Option<String>,
    pub sitemap_offset: Option<usize>,
    pub max_sitemaps: Option<usize>,
    pub max_urls_per_sitemap: Option<usize>,
    pub max_workers: Option<usize>,
    pub request_delay: Option<f64>,
    pub sitemaps: Vec<String>,
    pub flaresolverr_url: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub url_file: Option<PathBuf>,
    pub url_offset: Option<usize>,
    pub url_limit: Option<usize>,
}

impl ScrapeConfig {
    /// Resolve from the process environment.
    pub fn from_env(defaults: &SiteDefaults) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), defaults)
    }

    /// Resolve from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F, defaults: &SiteDefaults) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("CURR_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| defaults.base_url.to_string());

        let api_base_url = lookup("API_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .or_else(|| defaults.api_base_url.map(str::to_string));

        let request_delay: f64 = parse_var(&lookup, "REQUEST_DELAY", defaults.request_delay_secs)?;
        let cold_start: f64 = parse_var(&lookup, "COLD_START_DELAY", 0.0)?;
        let fs_timeout: u64 = parse_var(&lookup, "FLARESOLVERR_TIMEOUT", 60)?;
        let timeout: u64 = parse_var(&lookup, "REQUEST_TIMEOUT", 30)?;

        let transport = match lookup("TRANSPORT").as_deref().map(str::trim) {
            None | Some("") => defaults.transport,
            Some("direct") => Transport::Direct,
            Some("flaresolverr") => Transport::FlareSolverr,
            Some("fallback") => Transport::DirectWithFallback,
            Some(other) => {
                return Err(HarvestError::Config(format!(
                    "TRANSPORT must be direct, flaresolverr or fallback (got {other:?})"
                )))
            }
        };

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_base_url,
            sitemap_offset: parse_var(&lookup, "SITEMAP_OFFSET", 0)?,
            max_sitemaps: parse_var(&lookup, "MAX_SITEMAPS", 0)?,
            max_urls_per_sitemap: parse_var(&lookup, "MAX_URLS_PER_SITEMAP", 0)?,
            max_workers: parse_var::<usize, _>(&lookup, "MAX_WORKERS", 4)?.max(1),
            request_delay: secs(request_delay, "REQUEST_DELAY")?,
            request_timeout: Duration::from_secs(timeout),
            max_attempts: parse_var(&lookup, "MAX_ATTEMPTS", defaults.max_attempts)?,
            sitemap_overrides: split_list(lookup("SITEMAP_URLS_OVERRIDE").as_deref()),
            user_agent: lookup("USER_AGENT").filter(|v| !v.trim().is_empty()),
            cold_start_delay: secs(cold_start, "COLD_START_DELAY")?,
            transport,
            flaresolverr_url: lookup("FLARESOLVERR_URL").filter(|v| !v.trim().is_empty()),
            flaresolverr_timeout: Duration::from_secs(fs_timeout),
            output_dir: lookup("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            url_file: lookup("URL_FILE").filter(|v| !v.is_empty()).map(PathBuf::from),
            url_offset: parse_var(&lookup, "URL_OFFSET", 0)?,
            url_limit: parse_var(&lookup, "URL_LIMIT", 0)?,
        })
    }

    /// Apply CLI overrides on top of the resolved values.
    pub fn apply(mut self, o: ScrapeOverrides) -> Result<Self> {
        if let Some(v) = o.base_url {
            self.base_url = v.trim_end_matches('/').to_string();
        }
        if o.api_base_url.is_some() {
            self.api_base_url = o.api_base_url;
        }
        if let Some(v) = o.sitemap_offset {
            self.sitemap_offset = v;
        }
        if let Some(v) = o.max_sitemaps {
            self.max_sitemaps = v;
        }
        if let Some(v) = o.max_urls_per_sitemap {
            self.max_urls_per_sitemap = v;
        }
        if let Some(v) = o.max_workers {
            self.max_workers = v.max(1);
        }
        if let Some(v) = o.request_delay {
            self.request_delay = secs(v, "--delay")?;
        }
        if !o.sitemaps.is_empty() {
            self.sitemap_overrides = o.sitemaps;
        }
        if o.flaresolverr_url.is_some() {
            self.flaresolverr_url = o.flaresolverr_url;
        }
        if let Some(v) = o.output_dir {
            self.output_dir = v;
        }
        if o.url_file.is_some() {
            self.url_file = o.url_file;
        }
        if let Some(v) = o.url_offset {
            self.url_offset = v;
        }
        if let Some(v) = o.url_limit {
            self.url_limit = v;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check cross-field requirements.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(HarvestError::Config(
                "CURR_URL is required (or pass --base-url)".to_string(),
            ));
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(HarvestError::Config(format!(
                "CURR_URL is not a valid URL: {}",
                self.base_url
            )));
        }
        if self.transport != Transport::Direct && self.flaresolverr_url.is_none() {
            return Err(HarvestError::Config(
                "FLARESOLVERR_URL is required for this transport".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the chunk planner.
#[derive(Debug, Clone)]
pub struct PlanConfig {
    pub base_url: String,
    pub sitemap_offset: usize,
    pub max_sitemaps: usize,
    pub max_urls_per_sitemap: usize,
    pub chunk_size: usize,
    pub urls_per_job: usize,
    pub max_workers: usize,
    pub sitemap_overrides: Vec<String>,
    pub flaresolverr_url: Option<String>,
    pub github_output: Option<PathBuf>,
    pub url_file: PathBuf,
}

impl PlanConfig {
    pub fn from_env(default_max_sitemaps: usize) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), default_max_sitemaps)
    }

    pub fn from_lookup<F>(lookup: F, default_max_sitemaps: usize) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("CURR_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| HarvestError::Config("CURR_URL is required".to_string()))?;
        let chunk_size: usize = parse_var(&lookup, "CHUNK_SIZE", 50_000)?;
        let urls_per_job: usize = parse_var(&lookup, "URLS_PER_JOB", 500)?;
        if chunk_size == 0 || urls_per_job == 0 {
            return Err(HarvestError::Config(
                "CHUNK_SIZE and URLS_PER_JOB must be positive".to_string(),
            ));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            sitemap_offset: parse_var(&lookup, "SITEMAP_OFFSET", 0)?,
            max_sitemaps: parse_var(&lookup, "MAX_SITEMAPS", default_max_sitemaps)?,
            max_urls_per_sitemap: parse_var(&lookup, "MAX_URLS_PER_SITEMAP", 0)?,
            chunk_size,
            urls_per_job,
            max_workers: parse_var::<usize, _>(&lookup, "MAX_WORKERS", 5)?.max(1),
            sitemap_overrides: split_list(lookup("SITEMAP_URLS_OVERRIDE").as_deref()),
            flaresolverr_url: lookup("FLARESOLVERR_URL").filter(|v| !v.trim().is_empty()),
            github_output: lookup("GITHUB_OUTPUT")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            url_file: lookup("URL_FILE")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("chunk_urls.csv")),
        })
    }
}

fn parse_var<T, F>(lookup: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse::<T>().map_err(|_| {
            HarvestError::Config(format!("{name} has an invalid value: {raw:?}"))
        }),
        _ => Ok(default),
    }
}

fn secs(value: f64, name: &str) -> Result<Duration> {
    if !value.is_finite() || value < 0.0 {
        return Err(HarvestError::Config(format!(
            "{name} must be a non-negative number of seconds"
        )));
    }
    Ok(Duration::from_secs_f64(value))
}

/// Split a comma-separated list, dropping blanks.
pub fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
