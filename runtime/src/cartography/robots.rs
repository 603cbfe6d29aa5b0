//! robots.txt `Sitemap:` discovery.

use crate::acquisition::backoff::Backoff;
use crate::acquisition::source::PageSource;
use crate::error::Result;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, warn};

static RE_TAGS: OnceLock<Regex> = OnceLock::new();
static RE_HTTP: OnceLock<Regex> = OnceLock::new();

/// Pull the first http(s) URL out of text that may carry markup or quotes.
///
/// FlareSolverr wraps plain-text responses in `<pre>`, so directive values
/// can arrive as `https://x/sitemap.xml</pre></body>`.
pub fn sanitize_url_text(text: &str) -> Option<String> {
    let tags = RE_TAGS.get_or_init(|| Regex::new(r"<[^>]+>").unwrap());
    let http = RE_HTTP.get_or_init(|| Regex::new(r#"https?://[^\s"'<>]+"#).unwrap());
    let stripped = tags.replace_all(text, " ");
    http.find(&stripped).map(|m| m.as_str().to_string())
}

/// Every `Sitemap:` directive in a robots.txt body, in file order.
pub fn sitemap_directives(robots_txt: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in robots_txt.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case("sitemap") {
                if let Some(url) = sanitize_url_text(value) {
                    if !out.contains(&url) {
                        out.push(url);
                    }
                }
            }
        }
    }
    out
}

/// Fetch `{base}/robots.txt` and return its sitemap directives.
///
/// Retries up to `attempts` times with `backoff` between attempts. An
/// unreachable robots.txt yields an empty list, not an error.
pub async fn discover_sitemaps(
    source: &dyn PageSource,
    base_url: &str,
    attempts: u32,
    backoff: &Backoff,
) -> Result<Vec<String>> {
    let robots_url = format!("{}/robots.txt", base_url.trim_end_matches('/'));
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match source.fetch_raw(&robots_url).await {
            Ok(page) => {
                let found = sitemap_directives(&page.text());
                info!(url = %robots_url, count = found.len(), "robots.txt sitemap directives");
                return Ok(found);
            }
            Err(e) if attempt < attempts => {
                let wait = backoff.delay(attempt);
                warn!(url = %robots_url, attempt, "robots.txt fetch failed ({e}), retrying in {:?}", wait);
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                warn!(url = %robots_url, "robots.txt unavailable: {e}");
            }
        }
    }
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::http_client::{HttpClient, RetryPolicy};
    use crate::acquisition::source::DirectSource;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_directives_case_insensitive() {
        let robots = "User-agent: *\nDisallow: /cart\nSitemap: https://a.example/sitemap.xml\n\
                      sitemap:https://a.example/sitemap-products-1.xml\n# Sitemap: https://commented\n\
                      SITEMAP: https://a.example/sitemap.xml\n";
        let found = sitemap_directives(robots);
        assert_eq!(
            found,
            vec![
                "https://a.example/sitemap.xml".to_string(),
                "https://a.example/sitemap-products-1.xml".to_string(),
            ]
        );
    }

    #[test]
    fn test_sanitize_strips_markup() {
        assert_eq!(
            sanitize_url_text(" https://a.example/s.xml</pre></body></html>").as_deref(),
            Some("https://a.example/s.xml")
        );
        assert_eq!(sanitize_url_text("not a url"), None);
    }

    #[test]
    fn test_directive_with_port_keeps_full_url() {
        let found = sitemap_directives("Sitemap: http://localhost:8080/sitemap.xml");
        assert_eq!(found, vec!["http://localhost:8080/sitemap.xml".to_string()]);
    }

    #[tokio::test]
    async fn test_discover_retries_then_reads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(403))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("Sitemap: {}/sitemap_index.xml", server.uri())),
            )
            .mount(&server)
            .await;

        let http = HttpClient::new(Duration::from_secs(5), None, RetryPolicy::immediate(1)).unwrap();
        let source = DirectSource::new(http);
        let found = discover_sitemaps(&source, &server.uri(), 2, &Backoff::none())
            .await
            .unwrap();
        assert_eq!(found, vec![format!("{}/sitemap_index.xml", server.uri())]);
    }

    #[tokio::test]
    async fn test_discover_missing_robots_is_empty() {
        let server = MockServer::start().await;
        let http = HttpClient::new(Duration::from_secs(5), None, RetryPolicy::immediate(1)).unwrap();
        let source = DirectSource::new(http);
        let found = discover_sitemaps(&source, &server.uri(), 1, &Backoff::none())
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}
