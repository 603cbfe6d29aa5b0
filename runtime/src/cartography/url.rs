//! URL helpers: product URL filters, normalisation and image absolutisation.

use url::Url;

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg"];

/// Substring-based product URL filter.
///
/// A URL passes when it contains any of `include` (or `include` is empty),
/// none of `exclude`, and, if `require_suffix` is set, ends with one of them.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    pub include: Vec<&'static str>,
    pub exclude: Vec<&'static str>,
    pub require_suffix: Vec<&'static str>,
    pub exclude_images: bool,
}

impl UrlFilter {
    pub fn including(include: &[&'static str]) -> Self {
        Self {
            include: include.to_vec(),
            ..Default::default()
        }
    }

    pub fn excluding(mut self, exclude: &[&'static str]) -> Self {
        self.exclude.extend_from_slice(exclude);
        self
    }

    pub fn with_suffix(mut self, suffix: &[&'static str]) -> Self {
        self.require_suffix.extend_from_slice(suffix);
        self
    }

    pub fn without_images(mut self) -> Self {
        self.exclude_images = true;
        self
    }

    pub fn accepts(&self, url: &str) -> bool {
        if !self.include.is_empty() && !self.include.iter().any(|p| url.contains(p)) {
            return false;
        }
        if self.exclude.iter().any(|p| url.contains(p)) {
            return false;
        }
        let lower = url.to_ascii_lowercase();
        let path = lower.split(['?', '#']).next().unwrap_or(lower.as_str());
        if !self.require_suffix.is_empty() && !self.require_suffix.iter().any(|s| path.ends_with(s)) {
            return false;
        }
        if self.exclude_images && IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            return false;
        }
        true
    }
}

/// `scheme://host[:port]/path` without trailing slash, query or fragment.
pub fn clean_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(u) => {
            let mut out = format!("{}://{}", u.scheme(), u.host_str().unwrap_or(""));
            if let Some(port) = u.port() {
                out.push_str(&format!(":{port}"));
            }
            out.push_str(u.path().trim_end_matches('/'));
            out
        }
        Err(_) => raw.trim().trim_end_matches('/').to_string(),
    }
}

/// Set `key=value` on the URL's query string, replacing an existing value.
pub fn with_query_param(raw: &str, key: &str, value: &str) -> String {
    match Url::parse(raw) {
        Ok(mut u) => {
            let kept: Vec<(String, String)> = u
                .query_pairs()
                .filter(|(k, _)| k != key)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            {
                let mut q = u.query_pairs_mut();
                q.clear();
                for (k, v) in &kept {
                    q.append_pair(k, v);
                }
                q.append_pair(key, value);
            }
            u.to_string()
        }
        Err(_) => raw.to_string(),
    }
}

/// First value of a query parameter.
pub fn query_param(raw: &str, key: &str) -> Option<String> {
    Url::parse(raw)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Last non-empty path segment.
pub fn last_path_segment(raw: &str) -> Option<String> {
    let path = match Url::parse(raw) {
        Ok(u) => u.path().to_string(),
        Err(_) => raw.split(['?', '#']).next().unwrap_or(raw).to_string(),
    };
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Path with leading/trailing slashes removed (`/a/b/` -> `a/b`).
pub fn trimmed_path(raw: &str) -> String {
    Url::parse(raw)
        .map(|u| u.path().trim_matches('/').to_string())
        .unwrap_or_default()
}

/// Make an image reference absolute against `base`.
pub fn absolutize_image(src: &str, base: &str) -> String {
    let src = src.trim();
    if src.is_empty() {
        return String::new();
    }
    if let Some(rest) = src.strip_prefix("//") {
        return format!("https://{rest}");
    }
    if src.starts_with('/') {
        return format!("{}{}", base.trim_end_matches('/'), src);
    }
    if src.starts_with("http://") || src.starts_with("https://") || src.starts_with("data:") {
        return src.to_string();
    }
    format!("https://{src}")
}

/// Rewrite a `.gz` sitemap link to its uncompressed `.xml` twin.
pub fn gz_to_xml(raw: &str) -> String {
    if let Some(stem) = raw.strip_suffix(".xml.gz") {
        format!("{stem}.xml")
    } else if let Some(stem) = raw.strip_suffix(".gz") {
        format!("{stem}.xml")
    } else {
        raw.to_string()
    }
}

/// Resolve a possibly relative link against a page URL.
pub fn resolve(base: &str, href: &str) -> Option<String> {
    Url::parse(base).ok()?.join(href).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_include_exclude() {
        let cymax = UrlFilter::default()
            .with_suffix(&[".htm"])
            .excluding(&["--C", "--PC", "sitemap", "robots"]);
        assert!(cymax.accepts("https://www.cymax.com/modern-sofa--123456.htm"));
        assert!(!cymax.accepts("https://www.cymax.com/sofas--C1234.htm"));
        assert!(!cymax.accepts("https://www.cymax.com/sofas--PC55.htm"));
        assert!(!cymax.accepts("https://www.cymax.com/about"));

        let walmart = UrlFilter::including(&["/ip/"]);
        assert!(walmart.accepts("https://www.walmart.com/ip/chair/123"));
        assert!(!walmart.accepts("https://www.walmart.com/browse/123"));
    }

    #[test]
    fn test_filter_images() {
        let f = UrlFilter::default().with_suffix(&[".html"]).without_images();
        assert!(f.accepts("https://www.furniturepick.com/sofa.html"));
        assert!(!f.accepts("https://www.furniturepick.com/sofa.jpg"));
        assert!(!f.accepts("https://www.furniturepick.com/sofa"));
    }

    #[test]
    fn test_clean_url() {
        assert_eq!(
            clean_url("https://www.walmart.com/ip/chair/123/?athbdg=L1600#reviews"),
            "https://www.walmart.com/ip/chair/123"
        );
        assert_eq!(clean_url("http://localhost:8080/p/1/"), "http://localhost:8080/p/1");
    }

    #[test]
    fn test_with_query_param() {
        assert_eq!(
            with_query_param("https://www.bisonoffice.com/p/desk", "bo", "0"),
            "https://www.bisonoffice.com/p/desk?bo=0"
        );
        assert_eq!(
            with_query_param("https://www.bisonoffice.com/p/desk?bo=1&c=2", "bo", "0"),
            "https://www.bisonoffice.com/p/desk?c=2&bo=0"
        );
    }

    #[test]
    fn test_query_and_segments() {
        let u = "https://www.bloomingdales.com/shop/product/sofa?ID=4567&CategoryID=1";
        assert_eq!(query_param(u, "ID").as_deref(), Some("4567"));
        assert_eq!(query_param(u, "missing"), None);
        assert_eq!(last_path_segment(u).as_deref(), Some("sofa"));
        assert_eq!(last_path_segment("https://a.example/").as_deref(), None);
        assert_eq!(trimmed_path("https://www.emmamason.com/sofa-123.html"), "sofa-123.html");
    }

    #[test]
    fn test_absolutize_image() {
        let base = "https://www.bisonoffice.com";
        assert_eq!(absolutize_image("//cdn.x/1.jpg", base), "https://cdn.x/1.jpg");
        assert_eq!(absolutize_image("/img/1.jpg", base), "https://www.bisonoffice.com/img/1.jpg");
        assert_eq!(absolutize_image("cdn.x/1.jpg", base), "https://cdn.x/1.jpg");
        assert_eq!(absolutize_image("https://cdn.x/1.jpg", base), "https://cdn.x/1.jpg");
        assert_eq!(absolutize_image("", base), "");
    }

    #[test]
    fn test_gz_to_xml() {
        assert_eq!(gz_to_xml("https://a/sitemap-products-1.xml.gz"), "https://a/sitemap-products-1.xml");
        assert_eq!(gz_to_xml("https://a/sitemap-products-1.gz"), "https://a/sitemap-products-1.xml");
        assert_eq!(gz_to_xml("https://a/sitemap.xml"), "https://a/sitemap.xml");
    }
}
