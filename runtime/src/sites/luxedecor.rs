//! LuxeDecor: product data from the storefront JSON API.
//!
//! `{api}/{ID}` carries the catalogue fields and `{api}/{ID}/overview-data`
//! the description, dimensions and specifications.

use crate::acquisition::backoff::Backoff;
use crate::cartography::url::{last_path_segment, UrlFilter};
use crate::cartography::walker::WalkOptions;
use crate::config::{ScrapeConfig, SiteDefaults};
use crate::error::{HarvestError, Result};
use crate::extraction::{json_text, Columns, ProductRecord, CATALOG_COLUMNS};
use crate::sites::{ScrapeContext, SiteProfile};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

pub struct LuxeDecor;

/// `acme-bertie-end-table-acf82842` -> `ACF82842`.
pub fn identifier(url: &str) -> Option<String> {
    let segment = last_path_segment(url)?;
    let tail = segment.rsplit('-').next().unwrap_or(&segment);
    (!tail.is_empty() && tail.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| tail.to_ascii_uppercase())
}

fn joined(parts: [String; 2]) -> String {
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" / ")
}

/// The single value of the named specification, if it has exactly one.
fn spec_value(overview: &Value, name: &str) -> String {
    overview
        .get("specifications")
        .and_then(|s| s.as_array())
        .and_then(|specs| specs.iter().find(|s| s.get("name").and_then(|n| n.as_str()) == Some(name)))
        .and_then(|spec| spec.get("values")?.as_array().cloned())
        .filter(|values| values.len() == 1)
        .map(|values| json_text(values[0].get("name")))
        .unwrap_or_default()
}

/// Map the two API payloads onto one record.
pub fn record(url: &str, product: &Value, overview: Option<&Value>) -> ProductRecord {
    let at = |path: &str| json_text(product.pointer(path));
    let over = |key: &str| overview.map(|o| json_text(o.get(key))).unwrap_or_default();

    ProductRecord {
        product_url: url.to_string(),
        product_id: at("/itemProperties/itemId"),
        name: at("/itemProperties/description"),
        sku: at("/itemProperties/sku"),
        brand: at("/vendor/name"),
        price: at("/pricingProperties/retailPrice"),
        quantity: at("/stockProperties/stockQty"),
        category: joined([at("/mainCategory/name"), at("/subCategory/name")]),
        category_url: joined([at("/mainCategory/link"), at("/subCategory/link")]),
        description: over("featureDescription"),
        dimensions: over("dimension"),
        group_attr_1: overview.map(|o| spec_value(o, "finish")).unwrap_or_default(),
        ..Default::default()
    }
}

#[async_trait]
impl SiteProfile for LuxeDecor {
    fn key(&self) -> &'static str {
        "luxedecor"
    }

    fn display_name(&self) -> &'static str {
        "LuxeDecor"
    }

    fn defaults(&self) -> SiteDefaults {
        SiteDefaults {
            base_url: "https://www.luxedecor.com",
            api_base_url: Some("https://www.luxedecor.com/api/product"),
            request_delay_secs: 2.0,
            max_attempts: 5,
            ..Default::default()
        }
    }

    fn columns(&self) -> Columns {
        CATALOG_COLUMNS
    }

    fn url_filter(&self) -> UrlFilter {
        UrlFilter::including(&["/product/"])
    }

    fn walk_options(&self, config: &ScrapeConfig) -> WalkOptions {
        let mut opts = WalkOptions::new(&config.base_url);
        opts.overrides = config.sitemap_overrides.clone();
        opts.robots_filter = Some("/sitemap-products-");
        opts.robots_attempts = 5;
        opts.robots_backoff = Backoff::Linear(Duration::from_secs(20));
        opts.rewrite_gz = true;
        opts
    }

    fn extra_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[("x-vercel-set-bypass-cookie", "true")]
    }

    async fn scrape(&self, ctx: &ScrapeContext, url: &str) -> Result<Vec<ProductRecord>> {
        let id = identifier(url)
            .ok_or_else(|| HarvestError::Extraction("No identifier found".to_string()))?;
        let api = ctx.api_base()?;

        let product: Value = ctx.http.get_json(&format!("{api}/{id}")).await?;
        if !product.is_object() {
            return Err(HarvestError::Extraction(format!("No API data for {id}")));
        }
        let overview: Option<Value> = match ctx
            .http
            .get_json(&format!("{api}/{id}/overview-data"))
            .await
        {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(id = %id, "no overview data: {e}");
                None
            }
        };

        let r = record(url, &product, overview.as_ref());
        if r.product_id.is_empty() {
            return Err(HarvestError::Extraction(format!("No product id in API data for {id}")));
        }
        Ok(vec![r])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sites::testing;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_identifier() {
        assert_eq!(
            identifier("https://www.luxedecor.com/product/acme-bertie-end-table-acf82842?phash=eff584")
                .as_deref(),
            Some("ACF82842")
        );
        assert_eq!(identifier("https://www.luxedecor.com/product/abc123").as_deref(), Some("ABC123"));
        assert_eq!(identifier("https://www.luxedecor.com/"), None);
    }

    #[tokio::test]
    async fn test_scrape_merges_overview() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/product/ACF1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "itemProperties": {"itemId": 501, "description": "Bertie End Table", "sku": "ACF-1"},
                "vendor": {"name": "Acme"},
                "pricingProperties": {"retailPrice": 129.5},
                "stockProperties": {"stockQty": 12},
                "mainCategory": {"name": "Furniture", "link": "/furniture"},
                "subCategory": {"name": "Tables", "link": "/furniture/tables"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/product/ACF1/overview-data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "featureDescription": "Solid wood",
                "dimension": "20 x 20 x 24",
                "specifications": [{"name": "finish", "values": [{"name": "Walnut"}]}]
            })))
            .mount(&server)
            .await;

        let ctx = testing::context(&server.uri(), Some(format!("{}/api/product", server.uri())));
        let url = format!("{}/product/bertie-end-table-acf1", server.uri());
        let rows = LuxeDecor.scrape(&ctx, &url).await.unwrap();
        let r = &rows[0];
        assert_eq!(r.product_id, "501");
        assert_eq!(r.name, "Bertie End Table");
        assert_eq!(r.price, "129.5");
        assert_eq!(r.quantity, "12");
        assert_eq!(r.category, "Furniture / Tables");
        assert_eq!(r.category_url, "/furniture / /furniture/tables");
        assert_eq!(r.description, "Solid wood");
        assert_eq!(r.dimensions, "20 x 20 x 24");
        assert_eq!(r.group_attr_1, "Walnut");
    }

    #[tokio::test]
    async fn test_scrape_without_overview_still_saves() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/product/ZZ9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "itemProperties": {"itemId": "9"}
            })))
            .mount(&server)
            .await;
        let ctx = testing::context(&server.uri(), Some(format!("{}/api/product", server.uri())));
        let rows = LuxeDecor
            .scrape(&ctx, &format!("{}/product/thing-zz9", server.uri()))
            .await
            .unwrap();
        assert_eq!(rows[0].product_id, "9");
        assert!(rows[0].description.is_empty());
    }
}
