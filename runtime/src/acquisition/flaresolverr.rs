//! FlareSolverr client.
//!
//! FlareSolverr runs a headless browser behind a small JSON command API
//! (`POST /v1`). Commands used here: `request.get`, `sessions.create` and
//! `sessions.destroy`. A solved `request.get` returns the rendered HTML plus
//! the cookies the browser collected; those cookies are replayed on later
//! requests from the same client.

use crate::acquisition::backoff::Backoff;
use crate::acquisition::captcha::is_captcha_page;
use crate::acquisition::http_client::{HttpClient, RetryPolicy};
use crate::error::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8191/v1";

/// A browser cookie as FlareSolverr reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "cmd")]
enum Command<'a> {
    #[serde(rename = "request.get")]
    RequestGet {
        url: &'a str,
        #[serde(rename = "maxTimeout")]
        max_timeout: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        session: Option<&'a str>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        cookies: Vec<Cookie>,
    },
    #[serde(rename = "sessions.create")]
    SessionsCreate { session: &'a str },
    #[serde(rename = "sessions.destroy")]
    SessionsDestroy { session: &'a str },
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    solution: Option<Solution>,
}

#[derive(Debug, Deserialize)]
struct Solution {
    #[serde(default)]
    url: String,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    response: String,
    #[serde(default)]
    cookies: Vec<Cookie>,
}

/// A page fetched through FlareSolverr.
#[derive(Debug, Clone)]
pub struct SolvedPage {
    pub html: String,
    pub final_url: String,
    pub status: u16,
}

/// Client for one FlareSolverr endpoint.
pub struct FlareSolverrClient {
    http: HttpClient,
    endpoint: String,
    max_timeout: Duration,
    attempts: u32,
    backoff: Backoff,
    session: Option<String>,
    cookies: Mutex<Vec<Cookie>>,
}

impl FlareSolverrClient {
    pub fn new(endpoint: &str, max_timeout: Duration) -> Result<Self> {
        // The HTTP timeout must outlive FlareSolverr's own browser timeout.
        let http = HttpClient::new(
            max_timeout + Duration::from_secs(15),
            None,
            RetryPolicy::immediate(1),
        )?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            max_timeout,
            attempts: 3,
            backoff: Backoff::Exponential {
                base: Duration::from_secs(1),
                max: Duration::from_secs(30),
                jitter: Duration::from_secs(1),
            },
            session: None,
            cookies: Mutex::new(Vec::new()),
        })
    }

    pub fn with_retry(mut self, attempts: u32, backoff: Backoff) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    async fn command(&self, cmd: &Command<'_>, timeout: Duration) -> Result<CommandResponse> {
        let body = serde_json::to_value(cmd)?;
        let resp = self.http.post_json(&self.endpoint, &body, timeout).await?;
        if resp.status != 200 {
            return Err(HarvestError::FlareSolverr(format!("http_{}", resp.status)));
        }
        let parsed: CommandResponse = resp.json()?;
        if parsed.status != "ok" {
            let msg = if parsed.message.is_empty() {
                "status_not_ok".to_string()
            } else {
                parsed.message
            };
            return Err(HarvestError::FlareSolverr(msg));
        }
        Ok(parsed)
    }

    /// Open a browser session on the endpoint and use it for later requests.
    pub async fn create_session(&mut self) -> Result<String> {
        let id = format!("harvest-{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        self.command(
            &Command::SessionsCreate { session: &id },
            Duration::from_secs(30),
        )
        .await?;
        info!(endpoint = %self.endpoint, session = %id, "FlareSolverr session created");
        self.session = Some(id.clone());
        Ok(id)
    }

    /// Destroy the current session, if any. Failures are logged only.
    pub async fn destroy_session(&mut self) {
        if let Some(id) = self.session.take() {
            if let Err(e) = self
                .command(
                    &Command::SessionsDestroy { session: &id },
                    Duration::from_secs(20),
                )
                .await
            {
                warn!(endpoint = %self.endpoint, "failed to destroy session {id}: {e}");
            }
        }
    }

    /// One `request.get` round trip, no retries.
    pub async fn solve(&self, url: &str) -> Result<SolvedPage> {
        let cookies = self.cookies.lock().map(|c| c.clone()).unwrap_or_default();
        let cmd = Command::RequestGet {
            url,
            max_timeout: self.max_timeout.as_millis() as u64,
            session: self.session.as_deref(),
            cookies,
        };
        let resp = self
            .command(&cmd, self.max_timeout + Duration::from_secs(15))
            .await?;
        let solution = resp
            .solution
            .ok_or_else(|| HarvestError::FlareSolverr("missing solution".to_string()))?;

        if !solution.cookies.is_empty() {
            if let Ok(mut jar) = self.cookies.lock() {
                for cookie in solution.cookies {
                    jar.retain(|c| c.name != cookie.name || c.domain != cookie.domain);
                    jar.push(cookie);
                }
            }
        }

        if solution.response.is_empty() {
            return Err(HarvestError::FlareSolverr("empty_response".to_string()));
        }
        if solution.status >= 400 {
            return Err(HarvestError::TargetStatus {
                url: url.to_string(),
                status: solution.status,
            });
        }

        Ok(SolvedPage {
            final_url: if solution.url.is_empty() {
                url.to_string()
            } else {
                solution.url
            },
            status: solution.status,
            html: solution.response,
        })
    }

    /// `solve` with retries and exponential backoff plus jitter.
    pub async fn fetch(&self, url: &str) -> Result<SolvedPage> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.solve(url).await {
                Ok(page) => return Ok(page),
                Err(e @ HarvestError::TargetStatus { status: 404, .. }) => return Err(e),
                Err(e) if attempt < self.attempts => {
                    debug!(url, attempt, "FlareSolverr attempt failed: {e}");
                    tokio::time::sleep(self.backoff.delay(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Cookies collected so far.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.cookies.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

/// Several FlareSolverr endpoints used round-robin.
pub struct HostPool {
    clients: Vec<FlareSolverrClient>,
}

impl HostPool {
    pub fn new(endpoints: &[String], max_timeout: Duration) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(HarvestError::Config(
                "at least one FlareSolverr URL is required".to_string(),
            ));
        }
        let clients = endpoints
            .iter()
            .map(|e| FlareSolverrClient::new(e, max_timeout))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { clients })
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Create one session per host. Hosts that refuse keep working sessionless.
    pub async fn open_sessions(&mut self) {
        for client in &mut self.clients {
            if let Err(e) = client.create_session().await {
                warn!(endpoint = %client.endpoint(), "session create failed: {e}");
            }
        }
    }

    pub async fn close_sessions(&mut self) {
        for client in &mut self.clients {
            client.destroy_session().await;
        }
    }

    /// Number of attempts for a given retry setting: `0` means one per host.
    pub fn attempts(&self, max_retries: usize) -> usize {
        if max_retries > 0 {
            max_retries
        } else {
            self.clients.len().max(1)
        }
    }

    /// Fetch on the host selected by `attempt`. CAPTCHA pages are errors.
    pub async fn solve_on(&self, attempt: usize, url: &str) -> (String, Result<SolvedPage>) {
        let client = &self.clients[attempt % self.clients.len()];
        let host = client.endpoint().to_string();
        let result = match client.solve(url).await {
            Ok(page) if is_captcha_page(&page.html, &page.final_url) => {
                Err(HarvestError::Captcha(page.final_url))
            }
            other => other,
        };
        (host, result)
    }

    /// Rotate over hosts until one returns a clean page.
    pub async fn fetch_rotating(&self, url: &str, max_retries: usize) -> Result<SolvedPage> {
        let mut last_error = String::from("unknown_error");
        for attempt in 0..self.attempts(max_retries) {
            let (host, result) = self.solve_on(attempt, url).await;
            match result {
                Ok(page) => return Ok(page),
                Err(e) => {
                    debug!(url, host = %host, "host attempt failed: {e}");
                    last_error = format!("{host}: {}", e.reason());
                }
            }
        }
        Err(HarvestError::FlareSolverr(format!(
            "All FlareSolverr retries failed ({last_error})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ok_solution(html: &str, status: u16) -> serde_json::Value {
        serde_json::json!({
            "status": "ok",
            "message": "Challenge not detected!",
            "solution": {
                "url": "https://shop.example/p/1",
                "status": status,
                "response": html,
                "cookies": [{"name": "cf_clearance", "value": "abc", "domain": ".shop.example"}]
            }
        })
    }

    #[test]
    fn test_command_serialization() {
        let cmd = Command::RequestGet {
            url: "https://shop.example/",
            max_timeout: 60000,
            session: None,
            cookies: vec![],
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["cmd"], "request.get");
        assert_eq!(json["maxTimeout"], 60000);
        assert!(json.get("session").is_none());
        assert!(json.get("cookies").is_none());

        let create = serde_json::to_value(Command::SessionsCreate { session: "s1" }).unwrap();
        assert_eq!(create["cmd"], "sessions.create");
        assert_eq!(create["session"], "s1");
    }

    #[tokio::test]
    async fn test_solve_returns_html_and_keeps_cookies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1"))
            .and(body_partial_json(serde_json::json!({"cmd": "request.get"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_solution("<html>hi</html>", 200)))
            .mount(&server)
            .await;

        let client =
            FlareSolverrClient::new(&format!("{}/v1", server.uri()), Duration::from_secs(5)).unwrap();
        let page = client.solve("https://shop.example/p/1").await.unwrap();
        assert_eq!(page.html, "<html>hi</html>");
        assert_eq!(page.status, 200);
        assert_eq!(client.cookies().len(), 1);
        assert_eq!(client.cookies()[0].name, "cf_clearance");
    }

    #[tokio::test]
    async fn test_target_error_status_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_solution("<html></html>", 403)))
            .mount(&server)
            .await;

        let client = FlareSolverrClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.solve("https://shop.example/p/1").await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.reason(), "target_http_403");
    }

    #[tokio::test]
    async fn test_empty_body_wins_over_target_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_solution("", 404)))
            .mount(&server)
            .await;

        let client = FlareSolverrClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.solve("https://shop.example/p/gone").await.unwrap_err();
        assert_eq!(err.reason(), "empty_response");
    }

    #[tokio::test]
    async fn test_fetch_does_not_retry_target_404() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_solution("<html>gone</html>", 404)))
            .expect(1)
            .mount(&server)
            .await;

        let client = FlareSolverrClient::new(&server.uri(), Duration::from_secs(5))
            .unwrap()
            .with_retry(3, Backoff::none());
        let err = client.fetch("https://shop.example/p/gone").await.unwrap_err();
        assert_eq!(err.reason(), "target_http_404");
    }

    #[tokio::test]
    async fn test_not_ok_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "error",
                "message": "Timeout after 60.0 seconds."
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = FlareSolverrClient::new(&server.uri(), Duration::from_secs(5))
            .unwrap()
            .with_retry(2, Backoff::none());
        let err = client.fetch("https://shop.example/").await.unwrap_err();
        assert!(err.to_string().contains("Timeout after 60.0 seconds."));
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"cmd": "sessions.create"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"cmd": "sessions.destroy"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = FlareSolverrClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let id = client.create_session().await.unwrap();
        assert!(id.starts_with("harvest-"));
        assert_eq!(id.len(), "harvest-".len() + 12);
        assert_eq!(client.session(), Some(id.as_str()));
        client.destroy_session().await;
        assert!(client.session().is_none());
    }

    #[tokio::test]
    async fn test_host_pool_rotates_past_captcha() {
        let blocked = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_solution(
                "<div>Our systems have detected unusual traffic</div>",
                200,
            )))
            .mount(&blocked)
            .await;
        let healthy = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_solution("<div>results</div>", 200)))
            .mount(&healthy)
            .await;

        let pool = HostPool::new(&[blocked.uri(), healthy.uri()], Duration::from_secs(5)).unwrap();
        assert_eq!(pool.attempts(0), 2);
        let page = pool.fetch_rotating("https://www.google.com/search?q=x", 0).await.unwrap();
        assert_eq!(page.html, "<div>results</div>");

        let err = pool.fetch_rotating("https://www.google.com/search?q=x", 1).await.unwrap_err();
        assert!(err.to_string().contains("All FlareSolverr retries failed"));
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert!(HostPool::new(&[], Duration::from_secs(5)).is_err());
    }
}
