//! Sitemap walking: entry-point discovery, index expansion, and product URL
//! collection with bounded recursion.

use crate::acquisition::backoff::Backoff;
use crate::acquisition::source::PageSource;
use crate::cartography::robots;
use crate::cartography::sitemap::{self, SitemapDocument};
use crate::cartography::url::{gz_to_xml, UrlFilter};
use crate::error::{HarvestError, Result};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Nested sitemap indexes deeper than this are ignored.
pub const MAX_DEPTH: usize = 6;

/// How a site's sitemaps are discovered.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub base_url: String,
    /// Explicit sitemap URLs; skips robots.txt entirely.
    pub overrides: Vec<String>,
    /// Keep only robots.txt sitemaps containing this substring.
    pub robots_filter: Option<&'static str>,
    pub robots_attempts: u32,
    pub robots_backoff: Backoff,
    /// Paths under `base_url` probed when robots.txt lists nothing.
    pub fallback_paths: Vec<&'static str>,
    /// Rewrite `.gz` child sitemap links to `.xml`.
    pub rewrite_gz: bool,
    pub max_depth: usize,
}

impl WalkOptions {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            overrides: Vec::new(),
            robots_filter: None,
            robots_attempts: 1,
            robots_backoff: Backoff::none(),
            fallback_paths: vec!["/sitemap.xml"],
            rewrite_gz: false,
            max_depth: MAX_DEPTH,
        }
    }
}

/// Walks a site's sitemaps through a [`PageSource`].
#[derive(Clone)]
pub struct SitemapWalker {
    source: Arc<dyn PageSource>,
    opts: WalkOptions,
}

impl SitemapWalker {
    pub fn new(source: Arc<dyn PageSource>, opts: WalkOptions) -> Self {
        Self { source, opts }
    }

    pub fn options(&self) -> &WalkOptions {
        &self.opts
    }

    /// Fetch and parse one sitemap.
    pub async fn fetch(&self, url: &str) -> Result<SitemapDocument> {
        let page = self.source.fetch_raw(url).await?;
        let text = sitemap::decode_payload(&page.body)?;
        Ok(sitemap::parse_sitemap_lenient(&text))
    }

    /// Sitemap URLs to start from: overrides, then robots.txt, then fallbacks.
    pub async fn entry_points(&self) -> Result<Vec<String>> {
        if !self.opts.overrides.is_empty() {
            info!(count = self.opts.overrides.len(), "using sitemap override list");
            return Ok(self.opts.overrides.clone());
        }

        let mut found = robots::discover_sitemaps(
            self.source.as_ref(),
            &self.opts.base_url,
            self.opts.robots_attempts,
            &self.opts.robots_backoff,
        )
        .await?;
        if let Some(needle) = self.opts.robots_filter {
            found.retain(|u| u.contains(needle));
        }
        if !found.is_empty() {
            return Ok(found);
        }

        for path in &self.opts.fallback_paths {
            let candidate = format!("{}{}", self.opts.base_url, path);
            match self.fetch(&candidate).await {
                Ok(doc) if !doc.entries.is_empty() => {
                    info!(url = %candidate, "using fallback sitemap");
                    return Ok(vec![candidate]);
                }
                Ok(_) => debug!(url = %candidate, "fallback sitemap empty"),
                Err(e) => debug!(url = %candidate, "fallback sitemap unavailable: {e}"),
            }
        }
        Ok(Vec::new())
    }

    /// The ordered list of sitemaps a run iterates over: entry points that
    /// are indexes are replaced by their children.
    pub async fn resolve_sitemaps(&self) -> Result<Vec<String>> {
        let entries = self.entry_points().await?;
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for entry in entries {
            let children = match self.child_sitemaps(&entry).await {
                Ok(children) => children,
                Err(e) => {
                    warn!(url = %entry, "failed to load sitemap entry point: {e}");
                    continue;
                }
            };
            for child in children {
                if seen.insert(child.clone()) {
                    out.push(child);
                }
            }
        }

        info!(count = out.len(), "resolved sitemaps");
        Ok(out)
    }

    /// The child sitemaps of an index, or the entry itself for a urlset.
    pub async fn child_sitemaps(&self, entry: &str) -> Result<Vec<String>> {
        let doc = self.fetch(entry).await?;
        if doc.is_index() {
            Ok(doc.urls().map(|u| self.rewrite(u)).collect())
        } else {
            Ok(vec![entry.to_string()])
        }
    }

    /// Product URLs reachable from `sitemap_url`, following nested indexes
    /// up to `max_depth`. Stops once `cap` URLs are collected (0 = no cap).
    pub async fn collect_urls(
        &self,
        sitemap_url: &str,
        filter: &UrlFilter,
        cap: usize,
    ) -> Result<Vec<String>> {
        let mut queue = VecDeque::from([(sitemap_url.to_string(), 0usize)]);
        let mut visited = HashSet::new();
        let mut seen = HashSet::new();
        let mut urls = Vec::new();

        while let Some((url, depth)) = queue.pop_front() {
            if !visited.insert(url.clone()) {
                continue;
            }
            let doc = match self.fetch(&url).await {
                Ok(doc) => doc,
                Err(e) if depth == 0 => return Err(e),
                Err(e) => {
                    warn!(url = %url, depth, "skipping nested sitemap: {e}");
                    continue;
                }
            };

            if doc.is_index() {
                if depth >= self.opts.max_depth {
                    warn!(url = %url, depth, "max sitemap depth reached");
                    continue;
                }
                for child in doc.urls() {
                    queue.push_back((self.rewrite(child), depth + 1));
                }
                continue;
            }

            for loc in doc.urls() {
                if filter.accepts(loc) && seen.insert(loc.to_string()) {
                    urls.push(loc.to_string());
                    if cap > 0 && urls.len() >= cap {
                        debug!(url = %sitemap_url, cap, "per-sitemap cap reached");
                        return Ok(urls);
                    }
                }
            }
        }

        Ok(urls)
    }

    fn rewrite(&self, url: &str) -> String {
        if self.opts.rewrite_gz {
            gz_to_xml(url)
        } else {
            url.to_string()
        }
    }
}

/// `items[offset .. offset + max]`; `max == 0` means to the end.
///
/// Returns `None` when `offset` is past the end, which callers treat as
/// "nothing left to do".
pub fn window<T>(items: &[T], offset: usize, max: usize) -> Option<&[T]> {
    if offset >= items.len() {
        return None;
    }
    let end = if max == 0 {
        items.len()
    } else {
        offset.saturating_add(max).min(items.len())
    };
    Some(&items[offset..end])
}

/// Error for a run that found no sitemaps at all.
pub fn no_sitemaps(base_url: &str) -> HarvestError {
    HarvestError::Sitemap(format!("no sitemaps found for {base_url}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::http_client::{HttpClient, RetryPolicy};
    use crate::acquisition::source::DirectSource;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn walker(server: &MockServer, opts: impl FnOnce(&mut WalkOptions)) -> SitemapWalker {
        let http = HttpClient::new(Duration::from_secs(5), None, RetryPolicy::immediate(1)).unwrap();
        let mut o = WalkOptions::new(&server.uri());
        opts(&mut o);
        SitemapWalker::new(Arc::new(DirectSource::new(http)), o)
    }

    async fn serve(server: &MockServer, p: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    fn index(locs: &[String]) -> String {
        let items: String = locs
            .iter()
            .map(|l| format!("<sitemap><loc>{l}</loc></sitemap>"))
            .collect();
        format!("<sitemapindex>{items}</sitemapindex>")
    }

    fn urlset(locs: &[String]) -> String {
        let items: String = locs.iter().map(|l| format!("<url><loc>{l}</loc></url>")).collect();
        format!("<urlset>{items}</urlset>")
    }

    #[test]
    fn test_window() {
        let v = [1, 2, 3, 4, 5];
        assert_eq!(window(&v, 0, 0), Some(&v[..]));
        assert_eq!(window(&v, 1, 2), Some(&v[1..3]));
        assert_eq!(window(&v, 3, 10), Some(&v[3..]));
        assert_eq!(window(&v, 5, 1), None);
        assert_eq!(window::<i32>(&[], 0, 0), None);
    }

    #[tokio::test]
    async fn test_robots_index_children() {
        let server = MockServer::start().await;
        let base = server.uri();
        serve(&server, "/robots.txt", format!("Sitemap: {base}/sitemap_index.xml\n")).await;
        serve(
            &server,
            "/sitemap_index.xml",
            index(&[format!("{base}/s1.xml"), format!("{base}/s2.xml")]),
        )
        .await;

        let sitemaps = walker(&server, |_| {}).resolve_sitemaps().await.unwrap();
        assert_eq!(sitemaps, vec![format!("{base}/s1.xml"), format!("{base}/s2.xml")]);
    }

    #[tokio::test]
    async fn test_robots_filter_and_gz_rewrite() {
        let server = MockServer::start().await;
        let base = server.uri();
        serve(
            &server,
            "/robots.txt",
            format!("Sitemap: {base}/sitemap-pages.xml\nSitemap: {base}/sitemap-products-1.xml\n"),
        )
        .await;
        serve(
            &server,
            "/sitemap-products-1.xml",
            index(&[format!("{base}/sitemap-products-1-a.gz")]),
        )
        .await;

        let w = walker(&server, |o| {
            o.robots_filter = Some("/sitemap-products-");
            o.rewrite_gz = true;
        });
        let sitemaps = w.resolve_sitemaps().await.unwrap();
        assert_eq!(sitemaps, vec![format!("{base}/sitemap-products-1-a.xml")]);
    }

    #[tokio::test]
    async fn test_fallback_paths_when_robots_empty() {
        let server = MockServer::start().await;
        let base = server.uri();
        serve(&server, "/robots.txt", "User-agent: *\n".to_string()).await;
        serve(&server, "/sitemap_index.xml", urlset(&[format!("{base}/p/1")])).await;

        let w = walker(&server, |o| {
            o.fallback_paths = vec!["/sitemap.xml", "/sitemap_index.xml"];
        });
        let entries = w.entry_points().await.unwrap();
        assert_eq!(entries, vec![format!("{base}/sitemap_index.xml")]);
        // A urlset entry point is its own single sitemap.
        assert_eq!(
            w.resolve_sitemaps().await.unwrap(),
            vec![format!("{base}/sitemap_index.xml")]
        );
    }

    #[tokio::test]
    async fn test_overrides_skip_robots() {
        let server = MockServer::start().await;
        let w = walker(&server, |o| {
            o.overrides = vec!["https://x.example/a.xml".to_string()];
        });
        assert_eq!(
            w.entry_points().await.unwrap(),
            vec!["https://x.example/a.xml".to_string()]
        );
    }

    #[tokio::test]
    async fn test_collect_recurses_filters_and_caps() {
        let server = MockServer::start().await;
        let base = server.uri();
        serve(
            &server,
            "/root.xml",
            index(&[format!("{base}/nested.xml"), format!("{base}/leaf2.xml")]),
        )
        .await;
        serve(&server, "/nested.xml", index(&[format!("{base}/leaf1.xml")])).await;
        serve(
            &server,
            "/leaf1.xml",
            urlset(&[
                format!("{base}/ip/a/1"),
                format!("{base}/browse/x"),
                format!("{base}/ip/a/1"),
            ]),
        )
        .await;
        serve(&server, "/leaf2.xml", urlset(&[format!("{base}/ip/b/2"), format!("{base}/ip/c/3")])).await;

        let w = walker(&server, |_| {});
        let filter = UrlFilter::including(&["/ip/"]);
        let all = w
            .collect_urls(&format!("{base}/root.xml"), &filter, 0)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.contains(&format!("{base}/ip/a/1")));
        assert!(!all.iter().any(|u| u.contains("/browse/")));

        let capped = w
            .collect_urls(&format!("{base}/root.xml"), &filter, 2)
            .await
            .unwrap();
        assert_eq!(capped.len(), 2);
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let server = MockServer::start().await;
        let base = server.uri();
        serve(&server, "/d0.xml", index(&[format!("{base}/d1.xml")])).await;
        serve(&server, "/d1.xml", index(&[format!("{base}/d2.xml")])).await;
        serve(&server, "/d2.xml", urlset(&[format!("{base}/p/1")])).await;

        let shallow = walker(&server, |o| o.max_depth = 1);
        let urls = shallow
            .collect_urls(&format!("{base}/d0.xml"), &UrlFilter::default(), 0)
            .await
            .unwrap();
        assert!(urls.is_empty());

        let deep = walker(&server, |_| {});
        let urls = deep
            .collect_urls(&format!("{base}/d0.xml"), &UrlFilter::default(), 0)
            .await
            .unwrap();
        assert_eq!(urls, vec![format!("{base}/p/1")]);
    }

    #[tokio::test]
    async fn test_missing_top_level_sitemap_is_error() {
        let server = MockServer::start().await;
        let w = walker(&server, |_| {});
        assert!(w
            .collect_urls(&format!("{}/gone.xml", server.uri()), &UrlFilter::default(), 0)
            .await
            .is_err());
    }
}
