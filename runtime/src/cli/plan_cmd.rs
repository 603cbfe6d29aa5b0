//! `harvest plan <site>`: count product URLs and emit a CI job matrix.

use crate::cartography::walker::SitemapWalker;
use crate::cli::output::{self, Styled};
use crate::cli::scrape_cmd::prefer_fallback;
use crate::config::{PlanConfig, ScrapeConfig, ScrapeOverrides};
use crate::pipeline::chunk::write_matrix;
use crate::pipeline::planner::{PlanMode, Planner};
use crate::sites::{self, ScrapeContext};
use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

pub async fn run(site: &str, mode: PlanMode) -> Result<()> {
    let profile = sites::lookup(site)?;
    let defaults = profile.defaults();
    let plan_config = PlanConfig::from_lookup(
        |key| {
            std::env::var(key).ok().or_else(|| {
                (key == "CURR_URL" && !defaults.base_url.is_empty())
                    .then(|| defaults.base_url.to_string())
            })
        },
        mode.default_max_sitemaps(),
    )?;

    let mut config = ScrapeConfig::from_env(&defaults)?.apply(ScrapeOverrides {
        base_url: Some(plan_config.base_url.clone()),
        sitemaps: plan_config.sitemap_overrides.clone(),
        flaresolverr_url: plan_config.flaresolverr_url.clone(),
        ..Default::default()
    })?;
    prefer_fallback(&mut config);
    let ctx = ScrapeContext::build(config, profile.as_ref())?;

    let walker = SitemapWalker::new(Arc::clone(&ctx.source), profile.walk_options(&ctx.config));
    let plan = Planner::new(&walker, profile.url_filter(), &plan_config)
        .plan(mode)
        .await?;

    if plan.chunks.is_empty() {
        warn!("nothing to plan");
    } else {
        write_matrix(&plan.chunks, &plan.outputs(), plan_config.github_output.as_deref())?;
    }

    // stdout may carry the matrix, so the summary goes to stderr.
    if !output::is_quiet() && !output::is_json() {
        let s = Styled::new();
        eprintln!(
            "  {} {} sitemaps, {} product URLs, {} chunks",
            s.ok_sym(),
            plan.sitemaps,
            plan.total_urls,
            plan.chunks.len()
        );
    }
    Ok(())
}
