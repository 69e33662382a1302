//! Cross-origin allow-list
//!
//! Origins match either exactly or by host suffix (`.lovable.app` admits
//! every subdomain). Requests without an `Origin` header are not
//! cross-origin and always pass.

use std::time::Duration;

use axum::http::request::Parts;
use axum::http::{header, HeaderValue, Method};
use serde::Deserialize;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Origins allowed to call the HTTP surface from a browser
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CorsPolicy {
    /// Origins matched verbatim, e.g. `http://localhost:5173`
    pub allowed_origins: Vec<String>,
    /// Origin suffixes, e.g. `.lovable.app`
    pub allowed_suffixes: Vec<String>,
    /// How long browsers may cache a preflight answer, in seconds
    pub max_age_secs: u64,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "https://lovable.dev".into(),
                "http://localhost:3000".into(),
                "http://127.0.0.1:3000".into(),
                "http://localhost:5173".into(),
                "http://127.0.0.1:5173".into(),
            ],
            allowed_suffixes: vec![".lovable.dev".into(), ".lovable.app".into()],
            max_age_secs: 3600,
        }
    }
}

impl CorsPolicy {
    /// Policy admitting nothing but same-origin requests
    pub fn deny_all() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allowed_suffixes: Vec::new(),
            max_age_secs: 3600,
        }
    }

    /// Add an exact origin
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    /// Add an origin suffix
    pub fn allow_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.allowed_suffixes.push(suffix.into());
        self
    }

    /// Whether a request carrying `origin` may be answered
    pub fn allows(&self, origin: Option<&str>) -> bool {
        let Some(origin) = origin.filter(|o| !o.is_empty()) else {
            return true;
        };

        self.allowed_origins.iter().any(|o| o == origin)
            || self.allowed_suffixes.iter().any(|s| origin.ends_with(s.as_str()))
    }

    /// Build the tower layer enforcing this policy
    pub fn layer(&self) -> CorsLayer {
        let policy = self.clone();

        CorsLayer::new()
            .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .map(|o| policy.allows(Some(o)))
                    .unwrap_or(false)
            }))
            .allow_methods([
                Method::GET,
                Method::PUT,
                Method::POST,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::HeaderName::from_static("x-requested-with"),
            ])
            .max_age(Duration::from_secs(self.max_age_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_origin_allowed() {
        let policy = CorsPolicy::deny_all();
        assert!(policy.allows(None));
        assert!(policy.allows(Some("")));
    }

    #[test]
    fn test_exact_and_suffix_matching() {
        let policy = CorsPolicy::default();

        assert!(policy.allows(Some("https://lovable.dev")));
        assert!(policy.allows(Some("https://preview.lovable.dev")));
        assert!(policy.allows(Some("https://bookworm-scanner-vision.lovable.app")));
        assert!(policy.allows(Some("http://localhost:5173")));

        assert!(!policy.allows(Some("http://localhost:8080")));
        assert!(!policy.allows(Some("https://evil-lovable.app.example.com")));
    }

    #[test]
    fn test_builder() {
        let policy = CorsPolicy::deny_all()
            .allow_origin("http://10.0.0.2:3000")
            .allow_suffix(".example.org");

        assert!(policy.allows(Some("http://10.0.0.2:3000")));
        assert!(policy.allows(Some("https://cam.example.org")));
        assert!(!policy.allows(Some("https://lovable.dev")));
    }
}
