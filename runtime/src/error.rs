//! Error types for the harvest library.

/// All errors raised by the harvest engine.
///
/// Per-URL failures are recorded and the run continues; only run-level
/// failures (bad configuration, no sitemaps, unwritable output) abort.
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    #[error("HTTP request failed for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("FlareSolverr solved {url} with target HTTP {status}")]
    TargetStatus { url: String, status: u16 },

    #[error("FlareSolverr error: {0}")]
    FlareSolverr(String),

    #[error("CAPTCHA challenge detected at {0}")]
    Captcha(String),

    #[error("Sitemap parse error: {0}")]
    Sitemap(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown site profile: {0}")]
    UnknownSite(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarvestError {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            HarvestError::Status { status, .. } | HarvestError::TargetStatus { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Short reason string for failure logs.
    pub fn reason(&self) -> String {
        match self {
            HarvestError::Status { status, .. } => format!("http_{status}"),
            HarvestError::TargetStatus { status, .. } => format!("target_http_{status}"),
            HarvestError::Http { source, .. } if source.is_timeout() => "timeout".to_string(),
            HarvestError::Http { .. } => "request_error".to_string(),
            HarvestError::Captcha(_) => "captcha".to_string(),
            HarvestError::FlareSolverr(msg) => msg.clone(),
            HarvestError::Extraction(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_reason() {
        let err = HarvestError::Status {
            url: "https://example.com/p/1".to_string(),
            status: 404,
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.reason(), "http_404");
        assert!(err.to_string().contains("HTTP 404"));
    }

    #[test]
    fn test_solver_reasons() {
        let err = HarvestError::TargetStatus {
            url: "https://example.com/p/1".to_string(),
            status: 503,
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.reason(), "target_http_503");
        assert_eq!(
            HarvestError::FlareSolverr("empty_response".to_string()).reason(),
            "empty_response"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: HarvestError = io.into();
        assert!(matches!(err, HarvestError::Io(_)));
        assert_eq!(err.status(), None);
    }
}
