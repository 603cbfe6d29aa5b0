//! `harvest sites`: list the built-in site profiles.

use crate::cli::output::{self, Styled};
use crate::sites;
use anyhow::Result;

pub fn run() -> Result<()> {
    let profiles = sites::all();

    if output::is_json() {
        let list: Vec<serde_json::Value> = profiles
            .iter()
            .map(|p| {
                let d = p.defaults();
                serde_json::json!({
                    "key": p.key(),
                    "name": p.display_name(),
                    "base_url": d.base_url,
                    "api_base_url": d.api_base_url,
                    "transport": d.transport,
                    "columns": p.columns().len(),
                })
            })
            .collect();
        output::print_json(&serde_json::json!({ "sites": list }));
        return Ok(());
    }

    let s = Styled::new();
    println!();
    for p in &profiles {
        let d = p.defaults();
        let base = if d.base_url.is_empty() {
            "(set CURR_URL)"
        } else {
            d.base_url
        };
        println!("  {} {:<32} {}", s.bold(&format!("{:<15}", p.key())), p.display_name(), s.dim(base));
    }
    println!();
    Ok(())
}
