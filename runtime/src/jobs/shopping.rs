//! Google Shopping seller check.
//!
//! For each input product, loads its Google Shopping page through a pool of
//! FlareSolverr hosts, picks the matching product card, reads the organic
//! offers grid, and records where the target seller ranks.

use crate::acquisition::flaresolverr::HostPool;
use crate::error::{HarvestError, Result};
use crate::extraction::microdata::{text_of, within};
use crate::extraction::scrape_timestamp;
use crate::jobs::{file_timestamp, Table};
use crate::pipeline::chunk::slice_for_job;
use scraper::{ElementRef, Html};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const TARGET_SELLER: &str = "1StopBedrooms";

/// Columns copied from the input row into every result.
pub const INPUT_COLUMNS: [&str; 10] = [
    "product_id",
    "web_id",
    "name",
    "mpn_sku",
    "gtin",
    "brand",
    "category",
    "keyword",
    "url",
    "osb_url",
];

#[derive(Debug, Clone)]
pub struct ShoppingOptions {
    pub chunk_id: usize,
    pub total_chunks: usize,
    pub input_file: PathBuf,
    pub output_dir: PathBuf,
    pub flaresolverr_urls: Vec<String>,
    /// Attempts per row; 0 means one per host.
    pub max_retries: usize,
    pub max_timeout: Duration,
    pub target_seller: String,
}

impl ShoppingOptions {
    pub fn new(chunk_id: usize, total_chunks: usize, input_file: PathBuf, flaresolverr_urls: Vec<String>) -> Self {
        Self {
            chunk_id,
            total_chunks,
            input_file,
            output_dir: PathBuf::from("output"),
            flaresolverr_urls,
            max_retries: 0,
            max_timeout: Duration::from_secs(45),
            target_seller: TARGET_SELLER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    ContainerNotFound,
    NoProducts,
    NoMatch,
    NoOffersFound,
    Completed,
    FlaresolverFailed,
}

impl OfferStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OfferStatus::ContainerNotFound => "container_not_found",
            OfferStatus::NoProducts => "no_products",
            OfferStatus::NoMatch => "no_match",
            OfferStatus::NoOffersFound => "no_offers_found",
            OfferStatus::Completed => "completed",
            OfferStatus::FlaresolverFailed => "flaresolver_failed",
        }
    }
}

/// One seller offer from the offers grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Competitor {
    pub product_id: String,
    pub seller: String,
    pub seller_product_name: String,
    pub seller_url: String,
    pub seller_price: String,
    pub last_fetched_date: String,
}

/// The input fields a lookup needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShoppingRow {
    pub product_id: String,
    pub web_id: String,
    pub name: String,
    pub mpn_sku: String,
    pub gtin: String,
    pub brand: String,
    pub category: String,
    pub keyword: String,
    pub url: String,
    pub osb_url: String,
}

impl ShoppingRow {
    pub fn from_table(table: &Table, row: &[String]) -> Self {
        let c = |name| table.cell(row, name).to_string();
        Self {
            product_id: c("product_id"),
            web_id: c("web_id"),
            name: c("name"),
            mpn_sku: c("mpn_sku"),
            gtin: c("gtin"),
            brand: c("brand"),
            category: c("category"),
            keyword: c("keyword"),
            url: c("url"),
            osb_url: c("osb_url"),
        }
    }
}

/// Per-product outcome; serializes as one `completed_products` row.
#[derive(Debug, Clone, Serialize)]
pub struct ShoppingResult {
    pub product_id: String,
    pub web_id: String,
    pub name: String,
    pub mpn_sku: String,
    pub gtin: String,
    pub brand: String,
    pub category: String,
    pub keyword: String,
    pub url: String,
    pub osb_url: String,
    pub last_response: String,
    pub osb_url_match: String,
    pub product_url: String,
    pub seller: String,
    pub product_name: String,
    pub cid: String,
    pub pid: String,
    pub last_fetched_date: String,
    pub osb_position: usize,
    pub osb_id: String,
    pub seller_count: usize,
    pub status: OfferStatus,
    #[serde(skip)]
    pub competitors: Vec<Competitor>,
}

impl ShoppingResult {
    fn for_row(row: &ShoppingRow, status: OfferStatus, last_response: impl Into<String>) -> Self {
        Self {
            product_id: row.product_id.clone(),
            web_id: row.web_id.clone(),
            name: row.name.clone(),
            mpn_sku: row.mpn_sku.clone(),
            gtin: row.gtin.clone(),
            brand: row.brand.clone(),
            category: row.category.clone(),
            keyword: row.keyword.clone(),
            url: row.url.clone(),
            osb_url: row.osb_url.clone(),
            last_response: last_response.into(),
            osb_url_match: String::new(),
            product_url: row.url.clone(),
            seller: String::new(),
            product_name: String::new(),
            cid: String::new(),
            pid: String::new(),
            last_fetched_date: scrape_timestamp(),
            osb_position: 0,
            osb_id: String::new(),
            seller_count: 0,
            status,
            competitors: Vec::new(),
        }
    }
}

/// Last path segment of a URL (or of a bare path).
pub fn path_slug(raw: &str) -> String {
    let path = match url::Url::parse(raw) {
        Ok(u) => u.path().to_string(),
        Err(_) => raw.split(['?', '#']).next().unwrap_or("").to_string(),
    };
    path.trim_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("")
        .to_string()
}

fn first_in<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    within(scope, css).into_iter().next()
}

/// Text of the first selector in `selectors` that matches with non-empty text.
fn first_text(scope: ElementRef<'_>, selectors: &[&str]) -> String {
    selectors
        .iter()
        .filter_map(|css| first_in(scope, css))
        .map(text_of)
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

fn is_set(text: &str) -> bool {
    text.to_lowercase().contains("set")
}

/// Parse one Google Shopping product page.
pub fn extract_offers(html: &str, row: &ShoppingRow, target_seller: &str) -> ShoppingResult {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let Some(container) = first_in(root, ".dURPMd") else {
        return ShoppingResult::for_row(row, OfferStatus::ContainerNotFound, "Product container not found");
    };

    let cards = within(container, ".MtXiu");
    if cards.is_empty() {
        return ShoppingResult::for_row(row, OfferStatus::NoProducts, "No products found");
    }

    // A "set" keyword must match a "set" product and vice versa.
    let wants_set = is_set(&row.keyword);
    let chosen = cards.iter().find_map(|card| {
        let product_name = first_text(*card, &["div.gkQHve", "[class*='gkQHve']"]);
        (is_set(&product_name) == wants_set).then(|| {
            (
                product_name,
                first_text(*card, &["span.WJMUdc", "[class*='WJMUdc']"]),
                card.value().attr("id").unwrap_or("").to_string(),
            )
        })
    });
    let Some((product_name, seller, cid)) = chosen else {
        return ShoppingResult::for_row(row, OfferStatus::NoMatch, "No matching product found");
    };

    let mut result = ShoppingResult::for_row(row, OfferStatus::NoOffersFound, "Offers grid not found");
    result.product_name = product_name;
    result.seller = seller;
    result.cid = cid;

    let Some(grid) = first_in(root, "div[jsname='RSFNod'][data-attrid='organic_offers_grid']") else {
        return result;
    };

    let or_na = |s: String| if s.is_empty() { "N/A".to_string() } else { s };
    let competitors: Vec<Competitor> = within(grid, ".R5K7Cb")
        .into_iter()
        .map(|offer| {
            let link = first_in(offer, "a.P9159d").or_else(|| first_in(offer, "a[href]"));
            Competitor {
                product_id: row.product_id.clone(),
                seller: or_na(first_text(offer, &["div.hP4iBf.gUf0b.uWvFpd", "[class*='hP4iBf']"])),
                seller_product_name: or_na(first_text(offer, &["div.Rp8BL", "[class*='Rp8BL']"])),
                seller_url: or_na(
                    link.and_then(|a| a.value().attr("href"))
                        .unwrap_or("")
                        .to_string(),
                ),
                seller_price: or_na(first_text(
                    offer,
                    &[
                        "div.QcEgce span[aria-hidden='true']",
                        "div.GBgquf span",
                        "[class*='QcEgce'] span",
                    ],
                )),
                last_fetched_date: result.last_fetched_date.clone(),
            }
        })
        .collect();

    if competitors.is_empty() {
        result.last_response = "No seller offers found".to_string();
        return result;
    }

    let position = competitors
        .iter()
        .position(|c| c.seller == target_seller)
        .map_or(0, |i| i + 1);
    let osb_id = if position > 0 {
        path_slug(&competitors[position - 1].seller_url)
    } else {
        String::new()
    };
    let input_slug = path_slug(&row.osb_url);
    if !input_slug.is_empty() && !osb_id.is_empty() && input_slug == osb_id {
        result.osb_url_match = "true".to_string();
    }

    result.osb_position = position;
    result.osb_id = osb_id;
    result.seller_count = competitors.len();
    result.status = OfferStatus::Completed;
    result.last_response = format!(
        "Completed - OSB Position: {position}, Total Sellers: {}",
        competitors.len()
    );
    result.competitors = competitors;
    result
}

/// Look up one row, rotating hosts until a page parses to `completed`.
pub async fn scrape_row(pool: &HostPool, row: &ShoppingRow, opts: &ShoppingOptions) -> ShoppingResult {
    let mut last_result: Option<ShoppingResult> = None;
    let mut last_error = String::new();

    for attempt in 0..pool.attempts(opts.max_retries) {
        let (host, fetched) = pool.solve_on(attempt, &row.url).await;
        let page = match fetched {
            Ok(page) => page,
            Err(e) => {
                last_error = format!("{host}: {}", e.reason());
                continue;
            }
        };

        let mut parsed = extract_offers(&page.html, row, &opts.target_seller);
        if !page.final_url.is_empty() {
            parsed.product_url = page.final_url;
        }
        parsed.last_response = format!(
            "{} | host={host} | attempt={}",
            parsed.last_response,
            attempt + 1
        );
        if parsed.status == OfferStatus::Completed {
            return parsed;
        }
        last_result = Some(parsed);
    }

    match last_result {
        Some(mut r) => {
            if !last_error.is_empty() {
                r.last_response = format!("{} | last_error={last_error}", r.last_response);
            }
            r
        }
        None => {
            let reason = if last_error.is_empty() {
                "unknown_error".to_string()
            } else {
                last_error
            };
            let mut r = ShoppingResult::for_row(
                row,
                OfferStatus::FlaresolverFailed,
                format!("All FlareSolverr retries failed ({reason})"),
            );
            r.product_url.clear();
            r
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShoppingReport {
    pub rows: usize,
    pub completed: usize,
    pub remaining: usize,
    pub sellers: usize,
    pub files: Vec<PathBuf>,
}

pub async fn run(opts: ShoppingOptions) -> Result<ShoppingReport> {
    if opts.flaresolverr_urls.is_empty() {
        return Err(HarvestError::Config("--flaresolverr-urls is empty".to_string()));
    }
    let table = Table::read(&opts.input_file)?;
    if table.rows.is_empty() {
        return Err(HarvestError::Config(format!(
            "input CSV is empty: {}",
            opts.input_file.display()
        )));
    }
    table.require(&["url"])?;

    let range = slice_for_job(table.rows.len(), opts.chunk_id, opts.total_chunks);
    let chunk = &table.rows[range];
    info!("chunk {}/{}: {} rows", opts.chunk_id, opts.total_chunks, chunk.len());

    let mut pool = HostPool::new(&opts.flaresolverr_urls, opts.max_timeout)?;
    pool.open_sessions().await;

    let mut completed: Vec<ShoppingResult> = Vec::new();
    let mut remaining: Vec<Vec<String>> = Vec::new();
    for (i, raw) in chunk.iter().enumerate() {
        let row = ShoppingRow::from_table(&table, raw);
        info!("processing row {}/{} product_id={}", i + 1, chunk.len(), row.product_id);
        let result = scrape_row(&pool, &row, &opts).await;
        if result.status == OfferStatus::Completed {
            completed.push(result);
        } else {
            warn!(product_id = %row.product_id, status = result.status.as_str(), "{}", result.last_response);
            remaining.push(remaining_row(
                raw,
                &[
                    result.status.as_str(),
                    result.last_response.as_str(),
                    result.last_fetched_date.as_str(),
                ],
            ));
        }
    }
    pool.close_sessions().await;

    let report = write_outputs(&opts, &table.headers, &completed, &remaining)?;
    info!(
        completed = report.completed,
        remaining = report.remaining,
        sellers = report.sellers,
        "shopping chunk finished"
    );
    Ok(ShoppingReport {
        rows: chunk.len(),
        ..report
    })
}

const REMAINING_EXTRA: [&str; 3] = ["status", "last_response", "last_fetched_date"];

fn remaining_row(raw: &[String], extra: &[&str; 3]) -> Vec<String> {
    let mut row = raw.to_vec();
    row.extend(extra.iter().map(|s| s.to_string()));
    row
}

fn write_outputs(
    opts: &ShoppingOptions,
    input_headers: &[String],
    completed: &[ShoppingResult],
    remaining: &[Vec<String>],
) -> Result<ShoppingReport> {
    std::fs::create_dir_all(&opts.output_dir)?;
    let ts = file_timestamp();
    let id = opts.chunk_id;
    let mut report = ShoppingReport {
        completed: completed.len(),
        remaining: remaining.len(),
        ..Default::default()
    };

    if !completed.is_empty() {
        let path = opts.output_dir.join(format!("completed_products_chunk{id}_{ts}.csv"));
        write_serialized(&path, completed)?;
        report.files.push(path);
    }

    let sellers: Vec<&Competitor> = completed.iter().flat_map(|r| &r.competitors).collect();
    report.sellers = sellers.len();
    if !sellers.is_empty() {
        let path = opts.output_dir.join(format!("completed_sellers_chunk{id}_{ts}.csv"));
        write_serialized(&path, &sellers)?;
        report.files.push(path);
    }

    if !remaining.is_empty() {
        let path = opts.output_dir.join(format!("remaining_chunk{id}_{ts}.csv"));
        write_remaining(&path, input_headers, remaining)?;
        report.files.push(path);
    }
    Ok(report)
}

fn write_serialized<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut w = csv::Writer::from_path(path)?;
    for row in rows {
        w.serialize(row)?;
    }
    w.flush()?;
    info!(file = %path.display(), rows = rows.len(), "saved");
    Ok(())
}

/// Input columns, then status columns. Input columns that share a status
/// column's name are replaced by it.
fn write_remaining(path: &Path, input_headers: &[String], rows: &[Vec<String>]) -> Result<()> {
    let keep: Vec<usize> = (0..input_headers.len())
        .filter(|&i| !REMAINING_EXTRA.contains(&input_headers[i].as_str()))
        .collect();
    let mut w = csv::Writer::from_path(path)?;
    let header: Vec<&str> = keep
        .iter()
        .map(|&i| input_headers[i].as_str())
        .chain(REMAINING_EXTRA)
        .collect();
    w.write_record(&header)?;
    for row in rows {
        let tail = &row[input_headers.len()..];
        let record: Vec<&str> = keep
            .iter()
            .map(|&i| row[i].as_str())
            .chain(tail.iter().map(String::as_str))
            .collect();
        w.write_record(&record)?;
    }
    w.flush()?;
    info!(file = %path.display(), rows = rows.len(), "saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><body>
      <div class="dURPMd">
        <div class="MtXiu" id="c1"><div class="gkQHve">Oak Bedroom Set 5pc</div><span class="WJMUdc">Wayfair</span></div>
        <div class="MtXiu" id="c2"><div class="gkQHve">Oak Queen Bed</div><span class="WJMUdc">Target</span></div>
      </div>
      <div jsname="RSFNod" data-attrid="organic_offers_grid">
        <div class="R5K7Cb">
          <div class="hP4iBf gUf0b uWvFpd">Wayfair</div><div class="Rp8BL">Oak Bed</div>
          <a class="P9159d" href="https://www.wayfair.com/p/oak-bed-1">x</a>
          <div class="QcEgce"><span aria-hidden="true">$499.00</span></div>
        </div>
        <div class="R5K7Cb">
          <div class="hP4iBf gUf0b uWvFpd">1StopBedrooms</div><div class="Rp8BL">Oak Queen Bed</div>
          <a class="P9159d" href="https://www.1stopbedrooms.com/oak-queen-bed/?utm=g">x</a>
        </div>
      </div>
    </body></html>"#;

    fn row(keyword: &str) -> ShoppingRow {
        ShoppingRow {
            product_id: "77".to_string(),
            keyword: keyword.to_string(),
            url: "https://www.google.com/shopping/product/1".to_string(),
            osb_url: "https://www.1stopbedrooms.com/oak-queen-bed".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_path_slug() {
        assert_eq!(path_slug("https://a.com/x/y/?q=1"), "y");
        assert_eq!(path_slug("/x/y"), "y");
        assert_eq!(path_slug(""), "");
        assert_eq!(path_slug("https://a.com/"), "");
    }

    #[test]
    fn test_extract_completed() {
        let r = extract_offers(PAGE, &row("oak queen bed"), TARGET_SELLER);
        assert_eq!(r.status, OfferStatus::Completed);
        assert_eq!(r.product_name, "Oak Queen Bed");
        assert_eq!(r.seller, "Target");
        assert_eq!(r.cid, "c2");
        assert_eq!(r.seller_count, 2);
        assert_eq!(r.osb_position, 2);
        assert_eq!(r.osb_id, "oak-queen-bed");
        assert_eq!(r.osb_url_match, "true");
        assert_eq!(r.competitors[0].seller_price, "$499.00");
        assert_eq!(r.competitors[1].seller_price, "N/A");
    }

    #[test]
    fn test_set_keyword_picks_set_card() {
        let r = extract_offers(PAGE, &row("bedroom set"), TARGET_SELLER);
        assert_eq!(r.cid, "c1");
    }

    #[test]
    fn test_failure_statuses() {
        let r = extract_offers("<html></html>", &row("x"), TARGET_SELLER);
        assert_eq!(r.status, OfferStatus::ContainerNotFound);

        let r = extract_offers(r#"<div class="dURPMd"></div>"#, &row("x"), TARGET_SELLER);
        assert_eq!(r.status, OfferStatus::NoProducts);

        let only_sets = r#"<div class="dURPMd"><div class="MtXiu"><div class="gkQHve">Dining Set</div></div></div>"#;
        let r = extract_offers(only_sets, &row("chair"), TARGET_SELLER);
        assert_eq!(r.status, OfferStatus::NoMatch);

        let no_grid = r#"<div class="dURPMd"><div class="MtXiu"><div class="gkQHve">Chair</div></div></div>"#;
        let r = extract_offers(no_grid, &row("chair"), TARGET_SELLER);
        assert_eq!(r.status, OfferStatus::NoOffersFound);
        assert_eq!(r.product_name, "Chair");
    }

    fn solution(html: &str) -> serde_json::Value {
        serde_json::json!({
            "status": "ok",
            "message": "",
            "solution": {"url": "https://www.google.com/shopping/product/1", "status": 200, "response": html, "cookies": []}
        })
    }

    #[tokio::test]
    async fn test_run_writes_outputs() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1"))
            .and(body_partial_json(serde_json::json!({"cmd": "request.get", "url": "https://g/ok"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(solution(PAGE)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1"))
            .and(body_partial_json(serde_json::json!({"cmd": "request.get", "url": "https://g/captcha"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(solution(
                "<html>Our systems have detected unusual traffic</html>",
            )))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1"))
            .and(body_partial_json(serde_json::json!({"cmd": "sessions.create"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1"))
            .and(body_partial_json(serde_json::json!({"cmd": "sessions.destroy"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        std::fs::write(
            &input,
            "product_id,keyword,url,osb_url,status\n\
             1,oak queen bed,https://g/ok,https://www.1stopbedrooms.com/oak-queen-bed,old\n\
             2,lamp,https://g/captcha,,old\n",
        )
        .unwrap();

        let mut opts = ShoppingOptions::new(1, 1, input, vec![format!("{}/v1", server.uri())]);
        opts.output_dir = dir.path().join("out");
        opts.max_timeout = Duration::from_secs(5);
        let report = run(opts).await.unwrap();

        assert_eq!(report.rows, 2);
        assert_eq!(report.completed, 1);
        assert_eq!(report.remaining, 1);
        assert_eq!(report.sellers, 2);
        assert_eq!(report.files.len(), 3);

        let remaining = report
            .files
            .iter()
            .find(|p| p.to_string_lossy().contains("remaining_chunk1_"))
            .unwrap();
        let mut rdr = csv::Reader::from_path(remaining).unwrap();
        let header: Vec<String> = rdr.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(
            header,
            ["product_id", "keyword", "url", "osb_url", "status", "last_response", "last_fetched_date"]
        );
        let rec = rdr.records().next().unwrap().unwrap();
        assert_eq!(&rec[4], "flaresolver_failed");
        assert!(rec[5].contains("captcha"));
    }
}
