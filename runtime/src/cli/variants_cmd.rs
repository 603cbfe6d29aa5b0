//! `harvest variants`: BBB variant lookup for one chunk of an input CSV.

use crate::cli::output::{self, Styled};
use crate::jobs::variants::{self, VariantsOptions, DEFAULT_API_BASE};
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, clap::Args)]
pub struct VariantsArgs {
    /// 1-based chunk number
    #[arg(long, env = "CHUNK_ID")]
    pub chunk_id: usize,
    /// Total number of chunks
    #[arg(long, env = "TOTAL_CHUNKS")]
    pub total_chunks: usize,
    /// Input CSV with a variant id column
    #[arg(long, env = "INPUT_FILE")]
    pub input_file: PathBuf,
    /// Directory for the output CSV and summary
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,
    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
    /// BBB API root
    #[arg(long, env = "BBB_API_BASE_URL", default_value = DEFAULT_API_BASE)]
    pub api_base: String,
}

pub async fn run(args: &VariantsArgs) -> Result<()> {
    let mut opts = VariantsOptions::new(args.chunk_id, args.total_chunks, args.input_file.clone());
    opts.output_dir = args.output_dir.clone();
    opts.timeout = Duration::from_secs(args.timeout);
    opts.api_base = args.api_base.trim_end_matches('/').to_string();

    let report = variants::run(opts).await?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "stats": report.stats,
            "output_file": report.output_file,
            "summary_file": report.summary_file,
        }));
    } else if !output::is_quiet() {
        let s = Styled::new();
        let st = &report.stats;
        println!();
        println!("  {} chunk {}/{} done", s.ok_sym(), args.chunk_id, args.total_chunks);
        println!("  Variant ids:   {}", st.total);
        println!("  Processed:     {}", st.processed);
        println!("  Errors:        {}", st.errors);
        println!("  Invalid ids:   {}", st.invalid);
        println!("  Output:        {}", report.output_file.display());
    }
    Ok(())
}
