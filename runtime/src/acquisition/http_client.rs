//! Async HTTP client wrapping reqwest.
//!
//! Sends a browser-like header set, retries transport errors and 5xx with a
//! configurable backoff, and waits out 429 responses before retrying.

use crate::acquisition::backoff::Backoff;
use crate::error::{HarvestError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Default desktop Chrome user agent.
pub const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                             AppleWebKit/537.36 (KHTML, like Gecko) \
                             Chrome/120.0.0.0 Safari/537.36";

const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Response from an HTTP request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Original requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response headers (selected subset).
    pub headers: Vec<(String, String)>,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Body decoded as UTF-8, falling back to Latin-1.
    pub fn text(&self) -> String {
        decode_text(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Decode bytes as UTF-8, or Latin-1 when they are not valid UTF-8.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Which family of request headers to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestProfile {
    /// A top-level page navigation.
    Document,
    /// An XHR-style JSON API call from a page on the base site.
    Json,
    /// Sitemaps and robots.txt.
    Xml,
}

/// Retry behaviour for GET requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay after a transport error or 5xx.
    pub backoff: Backoff,
    /// Delay after a timeout.
    pub timeout_wait: Duration,
    /// Delay after a 429 without a usable `Retry-After`.
    pub rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Fixed(Duration::from_secs(1)),
            timeout_wait: Duration::from_secs(2),
            rate_limit_wait: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// A policy that retries without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::none(),
            timeout_wait: Duration::ZERO,
            rate_limit_wait: Duration::ZERO,
        }
    }
}

/// HTTP client shared by every worker of a run.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    /// HTTP/1.1-only fallback client for sites that reject HTTP/2.
    h1_client: reqwest::Client,
    policy: RetryPolicy,
    base_url: Option<String>,
    timeout: Duration,
}

impl HttpClient {
    /// Create a client with the browser header set.
    pub fn new(timeout: Duration, user_agent: Option<&str>, policy: RetryPolicy) -> Result<Self> {
        Self::with_headers(timeout, user_agent, policy, &[])
    }

    /// Create a client that also sends `extra` on every request.
    pub fn with_headers(
        timeout: Duration,
        user_agent: Option<&str>,
        policy: RetryPolicy,
        extra: &[(&str, &str)],
    ) -> Result<Self> {
        let ua = user_agent.unwrap_or(CHROME_UA);
        let mut headers = browser_headers();
        for (name, value) in extra {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| HarvestError::Config(format!("bad header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| HarvestError::Config(format!("bad header value: {e}")))?;
            headers.insert(name, value);
        }

        let build = |h1: bool| {
            let mut builder = reqwest::Client::builder()
                .timeout(timeout)
                .redirect(reqwest::redirect::Policy::limited(5))
                .user_agent(ua)
                .default_headers(headers.clone());
            if h1 {
                builder = builder.http1_only();
            }
            builder
                .build()
                .map_err(|e| HarvestError::Config(format!("failed to build HTTP client: {e}")))
        };

        Ok(Self {
            client: build(false)?,
            h1_client: build(true)?,
            policy,
            base_url: None,
            timeout,
        })
    }

    /// Site root used for the `Referer` of JSON requests.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET with retries.
    ///
    /// Falls back to HTTP/1.1 on protocol errors (some CDNs reject HTTP/2).
    /// Non-2xx responses left after retrying surface as [`HarvestError::Status`].
    pub async fn get(&self, url: &str, profile: RequestProfile) -> Result<HttpResponse> {
        let result = self.get_inner(&self.client, url, profile).await;
        if let Err(HarvestError::Http { source, .. }) = &result {
            let err_str = format!("{source:?}");
            if err_str.contains("http2")
                || err_str.contains("protocol")
                || err_str.contains("connection closed")
            {
                debug!(url, "retrying over HTTP/1.1");
                return self.get_inner(&self.h1_client, url, profile).await;
            }
        }
        result
    }

    pub async fn get_text(&self, url: &str, profile: RequestProfile) -> Result<String> {
        Ok(self.get(url, profile).await?.text())
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        Ok(self.get(url, RequestProfile::Xml).await?.body)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get(url, RequestProfile::Json).await?.json()
    }

    async fn get_inner(
        &self,
        client: &reqwest::Client,
        url: &str,
        profile: RequestProfile,
    ) -> Result<HttpResponse> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let resp = self.request(client, url, profile).send().await;

            match resp {
                Ok(r) => {
                    let status = r.status().as_u16();

                    if status == 429 && attempt < max_attempts {
                        let wait = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.trim().parse::<u64>().ok())
                            .map(Duration::from_secs)
                            .unwrap_or(self.policy.rate_limit_wait)
                            .min(MAX_RETRY_AFTER);
                        warn!(url, attempt, "rate limited, waiting {:?}", wait);
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    if status >= 500 && attempt < max_attempts {
                        let wait = self.policy.backoff.delay(attempt);
                        debug!(url, status, attempt, "server error, retrying");
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    if !(200..300).contains(&status) {
                        return Err(HarvestError::Status {
                            url: url.to_string(),
                            status,
                        });
                    }

                    return read_response(url, r).await;
                }
                Err(e) => {
                    if attempt < max_attempts {
                        let wait = if e.is_timeout() {
                            self.policy.timeout_wait
                        } else {
                            self.policy.backoff.delay(attempt)
                        };
                        debug!(url, attempt, "request error: {e}");
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    return Err(HarvestError::Http {
                        url: url.to_string(),
                        source: e,
                    });
                }
            }
        }
    }

    fn request(
        &self,
        client: &reqwest::Client,
        url: &str,
        profile: RequestProfile,
    ) -> reqwest::RequestBuilder {
        let builder = client.get(url);
        match profile {
            RequestProfile::Document => builder,
            RequestProfile::Xml => builder.header(
                "Accept",
                "application/xml,text/xml;q=0.9,text/plain;q=0.8,*/*;q=0.5",
            ),
            RequestProfile::Json => {
                let mut builder = builder
                    .header("Accept", "application/json, text/plain, */*")
                    .header("X-Requested-With", "XMLHttpRequest")
                    .header("Sec-Fetch-Dest", "empty")
                    .header("Sec-Fetch-Mode", "cors")
                    .header("Sec-Fetch-Site", "same-origin");
                if let Some(base) = &self.base_url {
                    builder = builder.header("Referer", format!("{base}/"));
                }
                builder
            }
        }
    }

    /// GET a single URL with one attempt and caller-supplied headers.
    ///
    /// Returns the response whatever its status, so callers can branch on
    /// 404/429 themselves.
    pub async fn get_once(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse> {
        let mut builder = self.client.get(url);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let r = builder.send().await.map_err(|e| HarvestError::Http {
            url: url.to_string(),
            source: e,
        })?;
        read_response(url, r).await
    }

    /// POST a JSON body, single attempt, any status returned.
    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<HttpResponse> {
        let r = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .timeout(timeout.max(self.timeout))
            .json(body)
            .send()
            .await
            .map_err(|e| HarvestError::Http {
                url: url.to_string(),
                source: e,
            })?;
        read_response(url, r).await
    }
}

async fn read_response(url: &str, r: reqwest::Response) -> Result<HttpResponse> {
    let status = r.status().as_u16();
    let final_url = r.url().to_string();
    let headers: Vec<(String, String)> = r
        .headers()
        .iter()
        .filter(|(k, _)| {
            matches!(
                k.as_str(),
                "content-type" | "content-encoding" | "last-modified" | "retry-after" | "server"
            )
        })
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();

    let body = r
        .bytes()
        .await
        .map_err(|e| HarvestError::Http {
            url: url.to_string(),
            source: e,
        })?
        .to_vec();

    Ok(HttpResponse {
        url: url.to_string(),
        final_url,
        status,
        headers,
        body,
    })
}

fn browser_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    let pairs = [
        (
            "accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
        ("accept-language", "en-US,en;q=0.9"),
        ("cache-control", "no-cache"),
        ("sec-fetch-dest", "document"),
        ("sec-fetch-mode", "navigate"),
        ("sec-fetch-site", "none"),
        ("sec-fetch-user", "?1"),
        ("upgrade-insecure-requests", "1"),
    ];
    for (k, v) in pairs {
        h.insert(HeaderName::from_static(k), HeaderValue::from_static(v));
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(attempts: u32) -> HttpClient {
        HttpClient::new(Duration::from_secs(5), None, RetryPolicy::immediate(attempts)).unwrap()
    }

    #[test]
    fn test_decode_text_latin1_fallback() {
        assert_eq!(decode_text(b"plain"), "plain");
        assert_eq!(decode_text(&[0x63, 0x61, 0x66, 0xe9]), "caf\u{e9}");
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let body = client(3)
            .get_text(&format!("{}/flaky", server.uri()), RequestProfile::Document)
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(2)
            .get(&format!("{}/down", server.uri()), RequestProfile::Document)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(3)
            .get(&format!("{}/missing", server.uri()), RequestProfile::Document)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_rate_limit_honours_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(200).set_body_string("done"))
            .mount(&server)
            .await;

        let resp = client(2)
            .get(&format!("{}/busy", server.uri()), RequestProfile::Document)
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.text(), "done");
    }

    #[tokio::test]
    async fn test_json_profile_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1"))
            .and(header("x-requested-with", "XMLHttpRequest"))
            .and(header("referer", "https://shop.example/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":1}"#))
            .mount(&server)
            .await;

        let value: serde_json::Value = client(1)
            .with_base_url("https://shop.example/")
            .get_json(&format!("{}/api/1", server.uri()))
            .await
            .unwrap();
        assert_eq!(value["id"], 1);
    }

    #[tokio::test]
    async fn test_extra_session_headers_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-vercel-set-bypass-cookie", "true"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let c = HttpClient::with_headers(
            Duration::from_secs(5),
            Some("harvest-test"),
            RetryPolicy::immediate(1),
            &[("x-vercel-set-bypass-cookie", "true")],
        )
        .unwrap();
        let resp = c.get(&server.uri(), RequestProfile::Document).await.unwrap();
        assert_eq!(resp.status, 200);
    }
}
