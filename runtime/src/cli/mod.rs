//! CLI subcommand implementations for the `harvest` binary.

pub mod dashboard_cmd;
pub mod output;
pub mod plan_cmd;
pub mod scrape_cmd;
pub mod shopping_cmd;
pub mod sites_cmd;
pub mod variants_cmd;
