//! Detection of anti-bot interstitials (Google "sorry" pages, reCAPTCHA,
//! Cloudflare challenges). Solving is not attempted; callers rotate hosts
//! or record the URL as failed.

const MARKERS: &[&str] = &[
    "recaptcha",
    "google.com/sorry",
    "/sorry/index",
    "unusual traffic",
    "cf-chl-",
    "challenge-platform",
    "<title>just a moment...</title>",
];

/// True when the page (or the URL it ended up on) is a CAPTCHA or challenge.
pub fn is_captcha_page(html: &str, final_url: &str) -> bool {
    let url = final_url.to_ascii_lowercase();
    if url.contains("google.com/sorry") || url.contains("/sorry/index") {
        return true;
    }
    let lower = html.to_ascii_lowercase();
    MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_google_sorry_redirect() {
        assert!(is_captcha_page(
            "<html></html>",
            "https://www.google.com/sorry/index?continue=x"
        ));
    }

    #[test]
    fn test_detects_markers_in_body() {
        assert!(is_captcha_page(
            "Our systems have detected Unusual Traffic from your computer network",
            "https://www.google.com/search"
        ));
        assert!(is_captcha_page(
            r#"<div class="g-recaptcha"></div>"#,
            "https://www.google.com/search"
        ));
        assert!(is_captcha_page(
            "<html><head><title>Just a moment...</title></head></html>",
            "https://shop.example/p/1"
        ));
    }

    #[test]
    fn test_normal_page_passes() {
        assert!(!is_captcha_page(
            "<html><body><div class=\"dURPMd\"></div></body></html>",
            "https://www.google.com/search?q=sofa"
        ));
    }
}
