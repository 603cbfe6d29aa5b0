//! Page sources: where a run's HTML and sitemap payloads come from.

use crate::acquisition::flaresolverr::FlareSolverrClient;
use crate::acquisition::http_client::{HttpClient, RequestProfile};
use crate::error::{HarvestError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// A fetched document.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub body: Vec<u8>,
}

impl Page {
    pub fn text(&self) -> String {
        crate::acquisition::http_client::decode_text(&self.body)
    }
}

/// Fetch transport used by the sitemap walker and site profiles.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch an HTML document.
    async fn fetch_page(&self, url: &str) -> Result<Page>;

    /// Fetch a sitemap or robots.txt payload.
    async fn fetch_raw(&self, url: &str) -> Result<Page>;

    fn name(&self) -> &'static str;
}

/// Plain HTTP.
pub struct DirectSource {
    http: HttpClient,
}

impl DirectSource {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PageSource for DirectSource {
    async fn fetch_page(&self, url: &str) -> Result<Page> {
        let r = self.http.get(url, RequestProfile::Document).await?;
        Ok(Page {
            url: r.url,
            final_url: r.final_url,
            status: r.status,
            body: r.body,
        })
    }

    async fn fetch_raw(&self, url: &str) -> Result<Page> {
        let r = self.http.get(url, RequestProfile::Xml).await?;
        Ok(Page {
            url: r.url,
            final_url: r.final_url,
            status: r.status,
            body: r.body,
        })
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// Every request goes through FlareSolverr.
pub struct SolverSource {
    solver: Arc<FlareSolverrClient>,
}

impl SolverSource {
    pub fn new(solver: Arc<FlareSolverrClient>) -> Self {
        Self { solver }
    }
}

#[async_trait]
impl PageSource for SolverSource {
    async fn fetch_page(&self, url: &str) -> Result<Page> {
        let solved = self.solver.fetch(url).await?;
        Ok(Page {
            url: url.to_string(),
            final_url: solved.final_url,
            status: solved.status,
            body: solved.html.into_bytes(),
        })
    }

    async fn fetch_raw(&self, url: &str) -> Result<Page> {
        self.fetch_page(url).await
    }

    fn name(&self) -> &'static str {
        "flaresolverr"
    }
}

/// Direct first; FlareSolverr when the site answers 403 or 503.
pub struct FallbackSource {
    direct: DirectSource,
    solver: SolverSource,
}

impl FallbackSource {
    pub fn new(http: HttpClient, solver: Arc<FlareSolverrClient>) -> Self {
        Self {
            direct: DirectSource::new(http),
            solver: SolverSource::new(solver),
        }
    }

    fn is_blocked(err: &HarvestError) -> bool {
        matches!(err.status(), Some(403) | Some(503))
    }
}

#[async_trait]
impl PageSource for FallbackSource {
    async fn fetch_page(&self, url: &str) -> Result<Page> {
        match self.direct.fetch_page(url).await {
            Err(e) if Self::is_blocked(&e) => {
                debug!(url, "blocked, retrying through FlareSolverr");
                self.solver.fetch_page(url).await
            }
            other => other,
        }
    }

    async fn fetch_raw(&self, url: &str) -> Result<Page> {
        match self.direct.fetch_raw(url).await {
            Err(e) if Self::is_blocked(&e) => {
                debug!(url, "blocked, retrying through FlareSolverr");
                self.solver.fetch_raw(url).await
            }
            other => other,
        }
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::http_client::RetryPolicy;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fallback_uses_solver_on_403() {
        let site = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&site)
            .await;

        let solver = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "solution": {"url": "x", "status": 200, "response": "<urlset></urlset>"}
            })))
            .expect(1)
            .mount(&solver)
            .await;

        let http =
            HttpClient::new(Duration::from_secs(5), None, RetryPolicy::immediate(1)).unwrap();
        let fs = Arc::new(FlareSolverrClient::new(&solver.uri(), Duration::from_secs(5)).unwrap());
        let source = FallbackSource::new(http, fs);

        let page = source
            .fetch_raw(&format!("{}/sitemap.xml", site.uri()))
            .await
            .unwrap();
        assert_eq!(page.text(), "<urlset></urlset>");
    }

    #[tokio::test]
    async fn test_fallback_passes_through_404() {
        let site = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&site)
            .await;

        let http =
            HttpClient::new(Duration::from_secs(5), None, RetryPolicy::immediate(1)).unwrap();
        let fs = Arc::new(FlareSolverrClient::new("http://127.0.0.1:9/v1", Duration::from_secs(1)).unwrap());
        let source = FallbackSource::new(http, fs);
        let err = source.fetch_page(&site.uri()).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }
}
