//! `harvest shopping`: Google Shopping seller check for one chunk.

use crate::cli::output::{self, Styled};
use crate::jobs::shopping::{self, ShoppingOptions, TARGET_SELLER};
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, clap::Args)]
pub struct ShoppingArgs {
    /// 1-based chunk number
    #[arg(long, env = "CHUNK_ID")]
    pub chunk_id: usize,
    /// Total number of chunks
    #[arg(long, env = "TOTAL_CHUNKS")]
    pub total_chunks: usize,
    /// Input CSV of products with Google Shopping URLs
    #[arg(long, env = "INPUT_FILE")]
    pub input_file: PathBuf,
    /// Comma-separated FlareSolverr endpoints
    #[arg(long, env = "FLARESOLVERR_URLS", value_delimiter = ',', required = true)]
    pub flaresolverr_urls: Vec<String>,
    /// Attempts per product, 0 for one per endpoint
    #[arg(long, default_value_t = 0)]
    pub max_retries: usize,
    /// FlareSolverr maxTimeout in seconds
    #[arg(long, default_value_t = 45)]
    pub max_timeout: u64,
    /// Seller whose rank is reported
    #[arg(long, default_value = TARGET_SELLER)]
    pub target_seller: String,
    /// Directory for the output CSVs
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,
}

pub async fn run(args: &ShoppingArgs) -> Result<()> {
    let urls: Vec<String> = args
        .flaresolverr_urls
        .iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();
    let mut opts = ShoppingOptions::new(args.chunk_id, args.total_chunks, args.input_file.clone(), urls);
    opts.max_retries = args.max_retries;
    opts.max_timeout = Duration::from_secs(args.max_timeout);
    opts.target_seller = args.target_seller.clone();
    opts.output_dir = args.output_dir.clone();

    let report = shopping::run(opts).await?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "rows": report.rows,
            "completed": report.completed,
            "remaining": report.remaining,
            "sellers": report.sellers,
            "files": report.files,
        }));
    } else if !output::is_quiet() {
        let s = Styled::new();
        println!();
        println!("  {} chunk {}/{} done", s.ok_sym(), args.chunk_id, args.total_chunks);
        println!("  Rows:       {}", report.rows);
        println!("  Completed:  {}", report.completed);
        println!("  Remaining:  {}", report.remaining);
        println!("  Sellers:    {}", report.sellers);
        for file in &report.files {
            println!("  {}", s.dim(&file.display().to_string()));
        }
    }
    Ok(())
}
