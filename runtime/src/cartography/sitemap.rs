//! Parse sitemap.xml and sitemap index files.
//!
//! Payloads arrive gzip-compressed, Latin-1 encoded, CDATA-wrapped, or
//! buried inside the HTML page FlareSolverr renders around raw XML. The
//! strict parser handles well-formed documents; [`parse_sitemap_lenient`]
//! falls back to a `<loc>` regex when the XML is broken.

use crate::acquisition::http_client::decode_text;
use crate::error::{HarvestError, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::io::Read;
use std::sync::OnceLock;
use tracing::warn;

static RE_CDATA: OnceLock<Regex> = OnceLock::new();
static RE_LOC: OnceLock<Regex> = OnceLock::new();

/// Root element of a sitemap document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitemapKind {
    /// `<sitemapindex>`: entries are child sitemaps.
    Index,
    /// `<urlset>`: entries are pages.
    UrlSet,
}

/// An entry from a sitemap.
#[derive(Debug, Clone)]
pub struct SitemapEntry {
    pub url: String,
    pub lastmod: Option<DateTime<Utc>>,
    pub priority: Option<f32>,
}

/// A parsed sitemap.
#[derive(Debug, Clone)]
pub struct SitemapDocument {
    pub kind: SitemapKind,
    pub entries: Vec<SitemapEntry>,
}

impl SitemapDocument {
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.url.as_str())
    }

    /// True for a `<sitemapindex>`, or for a `<urlset>` whose every loc is
    /// itself a sitemap (some stores nest indexes that way).
    pub fn is_index(&self) -> bool {
        self.kind == SitemapKind::Index
            || (!self.entries.is_empty() && self.entries.iter().all(|e| is_sitemap_url(&e.url)))
    }
}

/// Whether a URL points at an XML sitemap file.
pub fn is_sitemap_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    path.ends_with(".xml") || path.ends_with(".xml.gz")
}

/// Decompress gzip payloads (detected by magic bytes) and decode text.
pub fn decode_payload(bytes: &[u8]) -> Result<String> {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut out = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut out)
            .map_err(|e| HarvestError::Sitemap(format!("gzip decode failed: {e}")))?;
        return Ok(decode_text(&out));
    }
    Ok(decode_text(bytes))
}

/// Unwrap CDATA sections and trim the text to the sitemap root element.
pub fn prepare_xml(raw: &str) -> String {
    let cdata = RE_CDATA.get_or_init(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").unwrap());
    let unwrapped = cdata.replace_all(raw, |caps: &regex::Captures<'_>| {
        caps[1]
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
    });

    for root in ["sitemapindex", "urlset"] {
        let open = format!("<{root}");
        let close = format!("</{root}>");
        if let Some(start) = unwrapped.find(&open) {
            if let Some(end) = unwrapped.rfind(&close) {
                if end > start {
                    return unwrapped[start..end + close.len()].to_string();
                }
            }
            return unwrapped[start..].to_string();
        }
    }
    unwrapped.into_owned()
}

/// Parse a sitemap XML string. Handles both `<urlset>` and `<sitemapindex>`.
pub fn parse_sitemap(xml: &str) -> Result<SitemapDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut kind: Option<SitemapKind> = None;
    let mut entries = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut current_loc = String::new();
    let mut current_lastmod = String::new();
    let mut current_priority = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if kind.is_none() {
                    kind = match name.as_str() {
                        "sitemapindex" => Some(SitemapKind::Index),
                        "urlset" => Some(SitemapKind::UrlSet),
                        _ => None,
                    };
                }
                if name == "url" || name == "sitemap" {
                    current_loc.clear();
                    current_lastmod.clear();
                    current_priority.clear();
                }
                stack.push(name);
            }
            Ok(Event::End(_)) => {
                let Some(name) = stack.pop() else { continue };
                if (name == "url" || name == "sitemap") && !current_loc.is_empty() {
                    entries.push(SitemapEntry {
                        url: std::mem::take(&mut current_loc),
                        lastmod: parse_date(&current_lastmod),
                        priority: current_priority.trim().parse::<f32>().ok(),
                    });
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default().trim().to_string();
                record_text(&stack, text, &mut current_loc, &mut current_lastmod, &mut current_priority);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e).trim().to_string();
                record_text(&stack, text, &mut current_loc, &mut current_lastmod, &mut current_priority);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(HarvestError::Sitemap(format!(
                    "XML parse error at {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    let kind = kind.ok_or_else(|| {
        HarvestError::Sitemap("no <urlset> or <sitemapindex> root element".to_string())
    })?;
    Ok(SitemapDocument { kind, entries })
}

fn record_text(
    stack: &[String],
    text: String,
    loc: &mut String,
    lastmod: &mut String,
    priority: &mut String,
) {
    let [.., parent, tag] = stack else { return };
    if parent != "url" && parent != "sitemap" {
        return;
    }
    match tag.as_str() {
        "loc" => *loc = text,
        "lastmod" => *lastmod = text,
        "priority" => *priority = text,
        _ => {}
    }
}

/// Extract every `<loc>` with a regex. Used when the XML does not parse.
pub fn extract_locs_regex(raw: &str) -> Vec<String> {
    let re = RE_LOC.get_or_init(|| {
        Regex::new(r"(?s)<loc>\s*(?:<!\[CDATA\[)?\s*(https?://[^<\]\s]+?)\s*(?:\]\]>)?\s*</loc>")
            .unwrap()
    });
    re.captures_iter(raw)
        .map(|c| c[1].replace("&amp;", "&"))
        .collect()
}

/// Prepare, parse, and fall back to regex extraction on failure.
pub fn parse_sitemap_lenient(raw: &str) -> SitemapDocument {
    let prepared = prepare_xml(raw);
    match parse_sitemap(&prepared) {
        Ok(doc) if !doc.entries.is_empty() => doc,
        Ok(doc) => {
            let locs = extract_locs_regex(raw);
            if locs.is_empty() {
                doc
            } else {
                from_locs(raw, locs)
            }
        }
        Err(e) => {
            let locs = extract_locs_regex(raw);
            warn!("sitemap XML unparseable ({e}), regex fallback found {} locs", locs.len());
            from_locs(raw, locs)
        }
    }
}

fn from_locs(raw: &str, locs: Vec<String>) -> SitemapDocument {
    let kind = if raw.contains("<sitemapindex")
        || (!locs.is_empty() && locs.iter().all(|l| is_sitemap_url(l)))
    {
        SitemapKind::Index
    } else {
        SitemapKind::UrlSet
    };
    SitemapDocument {
        kind,
        entries: locs
            .into_iter()
            .map(|url| SitemapEntry {
                url,
                lastmod: None,
                priority: None,
            })
            .collect(),
    }
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = s.parse::<DateTime<Utc>>() {
        return Some(dt);
    }
    if let Ok(dt) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(dt.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}
