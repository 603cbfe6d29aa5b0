// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use harvest_runtime::cli;
use harvest_runtime::cli::scrape_cmd::ScrapeArgs;
use harvest_runtime::cli::shopping_cmd::ShoppingArgs;
use harvest_runtime::cli::variants_cmd::VariantsArgs;
use harvest_runtime::dashboard::DEFAULT_PORT;
use harvest_runtime::pipeline::planner::PlanMode;

#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Harvest: sitemap-driven retailer product scraper",
    version,
    after_help = "Run 'harvest <command> --help' for details on each command.\nRun 'harvest sites' to list the built-in site profiles."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a site's sitemaps and export product rows to CSV
    Scrape {
        /// Site profile key (see `harvest sites`)
        site: String,
        #[command(flatten)]
        args: ScrapeArgs,
    },
    /// Count product URLs and emit a chunk matrix for CI
    Plan {
        /// Site profile key
        site: String,
        /// Chunk layout
        #[arg(long, value_enum, default_value = "flat")]
        mode: PlanMode,
    },
    /// Look up BBB variant ids from an input CSV
    Variants(VariantsArgs),
    /// Rank a seller among Google Shopping offers via FlareSolverr
    Shopping(ShoppingArgs),
    /// List built-in site profiles
    Sites,
    /// Serve the workflow dashboard
    Dashboard {
        /// Port to listen on
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules (and child
    // workflows) can check them
    if cli.json {
        std::env::set_var("HARVEST_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("HARVEST_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("HARVEST_VERBOSE", "1");
    }
    if cli.no_color {
        std::env::set_var("HARVEST_NO_COLOR", "1");
    }
    cli::output::init_tracing();

    let result = match cli.command {
        Commands::Scrape { site, args } => cli::scrape_cmd::run(&site, &args).await,
        Commands::Plan { site, mode } => cli::plan_cmd::run(&site, mode).await,
        Commands::Variants(args) => cli::variants_cmd::run(&args).await,
        Commands::Shopping(args) => cli::shopping_cmd::run(&args).await,
        Commands::Sites => cli::sites_cmd::run(),
        Commands::Dashboard { port } => cli::dashboard_cmd::run(port).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "harvest", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() && !cli::output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}
