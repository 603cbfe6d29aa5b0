//! The workflows the dashboard can launch. Each one re-invokes the
//! `harvest` binary with a fixed argument list.

use serde::ser::Serializer;
use serde::Serialize;

/// `KEY=value` pairs applied to the child's environment before any
/// per-request overrides.
pub type EnvPairs = &'static [(&'static str, &'static str)];

#[derive(Debug, Clone, Serialize)]
pub struct Workflow {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub config_hint: &'static str,
    pub color: &'static str,
    #[serde(serialize_with = "env_map")]
    pub default_env: EnvPairs,
    pub args: &'static [&'static str],
}

fn env_map<S: Serializer>(pairs: &EnvPairs, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(pairs.iter().map(|(k, v)| (*k, *v)))
}

const SITEMAP_HINT: &str = "CURR_URL, SITEMAP_OFFSET, MAX_SITEMAPS, MAX_URLS_PER_SITEMAP, MAX_WORKERS";

pub const WORKFLOWS: &[Workflow] = &[
    Workflow {
        key: "cymax-plan",
        name: "Cymax Sitemap",
        description: "Discover Cymax product URLs through FlareSolverr and plan chunks",
        category: "Sitemap",
        config_hint: "CURR_URL, FLARESOLVERR_URL, MAX_SITEMAPS, CHUNK_SIZE",
        color: "#FF6B6B",
        default_env: &[("CURR_URL", "https://www.cymax.com")],
        args: &["plan", "cymax", "--mode", "flat"],
    },
    Workflow {
        key: "cymax",
        name: "Cymax Products",
        description: "Scrape Cymax product pages listed in the planned URL file",
        category: "FlareSolverr",
        config_hint: "URL_FILE, URL_OFFSET, URL_LIMIT, FLARESOLVERR_URL",
        color: "#E17055",
        default_env: &[
            ("CURR_URL", "https://www.cymax.com"),
            ("URL_FILE", "chunk_urls.csv"),
            ("URL_OFFSET", "0"),
            ("URL_LIMIT", "0"),
        ],
        args: &["scrape", "cymax"],
    },
    Workflow {
        key: "emmamason",
        name: "Emma Mason",
        description: "Scrape Emma Mason product pages via JSON-LD",
        category: "JSON-LD",
        config_hint: SITEMAP_HINT,
        color: "#45B7D1",
        default_env: &[
            ("CURR_URL", "https://www.emmamason.com"),
            ("SITEMAP_OFFSET", "0"),
            ("MAX_SITEMAPS", "0"),
            ("MAX_URLS_PER_SITEMAP", "0"),
            ("MAX_WORKERS", "10"),
        ],
        args: &["scrape", "emmamason"],
    },
    Workflow {
        key: "furniturepick-plan",
        name: "FurniturePick Planner",
        description: "Count product URLs per sitemap and plan per-sitemap jobs",
        category: "Sitemap",
        config_hint: "CURR_URL, SITEMAP_OFFSET, MAX_SITEMAPS, URLS_PER_JOB",
        color: "#FDCB6E",
        default_env: &[("CURR_URL", "https://www.furniturepick.com")],
        args: &["plan", "furniturepick", "--mode", "per-sitemap"],
    },
    Workflow {
        key: "furniturepick",
        name: "FurnitureCart / FurniturePick",
        description: "Scrape FurniturePick products with bundle variations",
        category: "FlareSolverr",
        config_hint: "CURR_URL, FLARESOLVERR_URL, SITEMAP_OFFSET, MAX_SITEMAPS, MAX_WORKERS",
        color: "#FFEAA7",
        default_env: &[
            ("CURR_URL", "https://www.furniturepick.com"),
            ("SITEMAP_OFFSET", "0"),
            ("MAX_SITEMAPS", "0"),
            ("MAX_URLS_PER_SITEMAP", "0"),
            ("MAX_WORKERS", "4"),
        ],
        args: &["scrape", "furniturepick"],
    },
    Workflow {
        key: "bisonoffice",
        name: "BisonOffice",
        description: "Scrape BisonOffice product pages from microdata and dataLayer",
        category: "DataLayer",
        config_hint: SITEMAP_HINT,
        color: "#4ECDC4",
        default_env: &[
            ("CURR_URL", "https://www.bisonoffice.com"),
            ("SITEMAP_OFFSET", "0"),
            ("MAX_SITEMAPS", "0"),
            ("MAX_URLS_PER_SITEMAP", "0"),
            ("MAX_WORKERS", "4"),
        ],
        args: &["scrape", "bisonoffice"],
    },
    Workflow {
        key: "luxedecor",
        name: "LuxeDecor",
        description: "Fetch LuxeDecor products from the storefront JSON API",
        category: "API",
        config_hint: "CURR_URL, API_BASE_URL, SITEMAP_OFFSET, MAX_SITEMAPS, MAX_WORKERS",
        color: "#96CEB4",
        default_env: &[
            ("CURR_URL", "https://www.luxedecor.com"),
            ("SITEMAP_OFFSET", "0"),
            ("MAX_SITEMAPS", "0"),
            ("MAX_URLS_PER_SITEMAP", "0"),
            ("MAX_WORKERS", "4"),
        ],
        args: &["scrape", "luxedecor"],
    },
    Workflow {
        key: "bloomingdales",
        name: "Bloomingdale's",
        description: "Fetch Bloomingdale's products from the xapi product endpoint",
        category: "API",
        config_hint: "CURR_URL, API_BASE_URL, SITEMAP_OFFSET, MAX_SITEMAPS, MAX_WORKERS",
        color: "#DDA0DD",
        default_env: &[
            ("CURR_URL", "https://www.bloomingdales.com"),
            ("SITEMAP_OFFSET", "0"),
            ("MAX_SITEMAPS", "0"),
            ("MAX_URLS_PER_SITEMAP", "0"),
            ("MAX_WORKERS", "4"),
        ],
        args: &["scrape", "bloomingdales"],
    },
    Workflow {
        key: "walmart",
        name: "Walmart",
        description: "Scrape Walmart /ip/ pages, one row per variant",
        category: "JSON-LD",
        config_hint: SITEMAP_HINT,
        color: "#2E86DE",
        default_env: &[
            ("CURR_URL", "https://www.walmart.com"),
            ("SITEMAP_OFFSET", "0"),
            ("MAX_SITEMAPS", "0"),
            ("MAX_URLS_PER_SITEMAP", "0"),
            ("MAX_WORKERS", "4"),
        ],
        args: &["scrape", "walmart"],
    },
    Workflow {
        key: "generic",
        name: "Generic Storefront",
        description: "Scrape any schema.org-annotated storefront",
        category: "HTTP",
        config_hint: SITEMAP_HINT,
        color: "#2ECC71",
        default_env: &[
            ("CURR_URL", ""),
            ("SITEMAP_OFFSET", "0"),
            ("MAX_SITEMAPS", "0"),
            ("MAX_URLS_PER_SITEMAP", "0"),
            ("MAX_WORKERS", "8"),
        ],
        args: &["scrape", "generic"],
    },
    Workflow {
        key: "bbb",
        name: "BBB SKU Extractor",
        description: "Extract model numbers and attributes from the BBB API for variant IDs",
        category: "API",
        config_hint: "INPUT_FILE, CHUNK_ID, TOTAL_CHUNKS, BBB_API_BASE_URL",
        color: "#8E44AD",
        default_env: &[
            ("INPUT_FILE", "bbb_input.csv"),
            ("CHUNK_ID", "1"),
            ("TOTAL_CHUNKS", "1"),
        ],
        args: &["variants"],
    },
    Workflow {
        key: "gshopping",
        name: "Google Shopping",
        description: "Rank 1StopBedrooms among Google Shopping sellers via FlareSolverr",
        category: "FlareSolverr",
        config_hint: "INPUT_FILE, CHUNK_ID, TOTAL_CHUNKS, FLARESOLVERR_URLS",
        color: "#F39C12",
        default_env: &[
            ("INPUT_FILE", "gshopping_input.csv"),
            ("CHUNK_ID", "1"),
            ("TOTAL_CHUNKS", "1"),
        ],
        args: &["shopping"],
    },
];

pub fn lookup(key: &str) -> Option<&'static Workflow> {
    WORKFLOWS.iter().find(|w| w.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_keys_are_unique() {
        let keys: HashSet<&str> = WORKFLOWS.iter().map(|w| w.key).collect();
        assert_eq!(keys.len(), WORKFLOWS.len());
    }

    #[test]
    fn test_scrape_workflows_name_known_sites() {
        for wf in WORKFLOWS {
            if matches!(wf.args.first(), Some(&"scrape") | Some(&"plan")) {
                assert!(
                    crate::sites::lookup(wf.args[1]).is_ok(),
                    "{} targets unknown site {}",
                    wf.key,
                    wf.args[1]
                );
            }
        }
    }

    #[test]
    fn test_serializes_env_as_object() {
        let wf = lookup("emmamason").unwrap();
        let json = serde_json::to_value(wf).unwrap();
        assert_eq!(json["default_env"]["MAX_WORKERS"], "10");
        assert_eq!(json["args"][1], "emmamason");
        assert!(lookup("nope").is_none());
    }
}
