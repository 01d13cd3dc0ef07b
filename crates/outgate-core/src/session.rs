//! Session records, fingerprints and the per-request context.

use std::fmt;

use cookie::Cookie;
use http::HeaderMap;
use url::Url;

/// The verdict of one authenticator check.
///
/// Immutable once built; the cache shares it behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionRecord {
    /// Whether the authenticator accepted the session.
    pub authenticated: bool,
    /// Authenticator headers to add to the upstream request.
    pub forwarded_headers: HeaderMap,
    /// Session cookies issued by the authenticator, sent back downstream.
    pub session_cookies: Vec<Cookie<'static>>,
}

impl SessionRecord {
    /// An accepted session.
    pub fn authenticated(
        forwarded_headers: HeaderMap,
        session_cookies: Vec<Cookie<'static>>,
    ) -> Self {
        Self {
            authenticated: true,
            forwarded_headers,
            session_cookies,
        }
    }

    /// A rejected session. Rejections never forward headers.
    pub fn unauthenticated(session_cookies: Vec<Cookie<'static>>) -> Self {
        Self {
            authenticated: false,
            forwarded_headers: HeaderMap::new(),
            session_cookies,
        }
    }
}

/// Order-independent identifier of a set of session cookies.
///
/// Built from the sorted `name=value` pairs hashed with BLAKE3. A request
/// without session cookies gets the empty fingerprint, which never collides
/// with a hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a list of cookies.
    pub fn from_cookies(cookies: &[Cookie<'_>]) -> Self {
        if cookies.is_empty() {
            return Self::default();
        }

        let mut pairs: Vec<String> = cookies
            .iter()
            .map(|c| format!("{}={}", c.name(), c.value()))
            .collect();
        pairs.sort_unstable();

        let mut hasher = blake3::Hasher::new();
        for pair in &pairs {
            hasher.update(pair.as_bytes());
            hasher.update(b"\n");
        }

        Self(hasher.finalize().to_hex().to_string())
    }

    /// Returns `true` for the fingerprint of an empty cookie set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The fingerprint as a hex string (empty for no cookies).
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "<none>")
        } else {
            write!(f, "{}", &self.0[..12])
        }
    }
}

/// What the mediator knows about one downstream request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    url: Url,
    original_url: String,
    host: String,
    cookies: Vec<Cookie<'static>>,
    fingerprint: Fingerprint,
}

impl RequestContext {
    /// Build a context from the reconstructed URL, the raw `Host` value and
    /// the session cookies carried by the request.
    pub fn new(url: Url, host: impl Into<String>, cookies: Vec<Cookie<'static>>) -> Self {
        let fingerprint = Fingerprint::from_cookies(&cookies);
        Self {
            original_url: url.as_str().to_string(),
            url,
            host: host.into(),
            cookies,
            fingerprint,
        }
    }

    /// Keep the URL exactly as the client sent it.
    ///
    /// The parsed [`url`](Self::url) is normalized (dot segments, default
    /// ports); this is what the authenticator is told about.
    #[must_use]
    pub fn with_original_url(mut self, original_url: impl Into<String>) -> Self {
        self.original_url = original_url.into();
        self
    }

    /// Absolute URL of the downstream request, parsed.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Absolute URL of the downstream request, as sent.
    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    /// Downstream host, including the port when one was given.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Downstream scheme.
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Whether the downstream connection is TLS.
    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// Session cookies carried by the request.
    pub fn cookies(&self) -> &[Cookie<'static>] {
        &self.cookies
    }

    /// Cache key of the request's session.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn cookies(pairs: &[(&str, &str)]) -> Vec<Cookie<'static>> {
        pairs
            .iter()
            .map(|(n, v)| Cookie::new(n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let a = Fingerprint::from_cookies(&cookies(&[("A", "1"), ("B", "2")]));
        let b = Fingerprint::from_cookies(&cookies(&[("B", "2"), ("A", "1")]));
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_fingerprint_depends_on_values() {
        let a = Fingerprint::from_cookies(&cookies(&[("A", "1")]));
        let b = Fingerprint::from_cookies(&cookies(&[("A", "2")]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_pair_boundaries_matter() {
        let a = Fingerprint::from_cookies(&cookies(&[("A", "1B=2")]));
        let b = Fingerprint::from_cookies(&cookies(&[("A", "1"), ("B", "2")]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_fingerprint_is_sentinel() {
        let empty = Fingerprint::from_cookies(&[]);
        assert!(empty.is_empty());
        assert_eq!(empty, Fingerprint::default());
        assert_eq!(empty.as_str(), "");
        assert_eq!(empty.to_string(), "<none>");

        let some = Fingerprint::from_cookies(&cookies(&[("", "")]));
        assert_ne!(empty, some);
    }

    #[test]
    fn test_fingerprint_display_is_truncated() {
        let fp = Fingerprint::from_cookies(&cookies(&[("A", "1")]));
        assert_eq!(fp.as_str().len(), 64);
        assert_eq!(fp.to_string().len(), 12);
    }

    #[test]
    fn test_session_record_constructors() {
        let mut headers = HeaderMap::new();
        headers.insert("x-authentik-username", HeaderValue::from_static("alice"));

        let ok = SessionRecord::authenticated(headers.clone(), cookies(&[("c", "1")]));
        assert!(ok.authenticated);
        assert_eq!(ok.forwarded_headers, headers);
        assert_eq!(ok.session_cookies.len(), 1);

        let denied = SessionRecord::unauthenticated(cookies(&[("c", "1")]));
        assert!(!denied.authenticated);
        assert!(denied.forwarded_headers.is_empty());
        assert_eq!(denied.session_cookies.len(), 1);
    }

    #[test]
    fn test_request_context() {
        let url = Url::parse("https://example.com:8443/app?x=1").unwrap();
        let ctx = RequestContext::new(
            url.clone(),
            "example.com:8443",
            cookies(&[("authentik_proxy_session", "s1")]),
        );
        assert_eq!(ctx.url(), &url);
        assert_eq!(ctx.original_url(), "https://example.com:8443/app?x=1");
        assert_eq!(ctx.host(), "example.com:8443");
        assert_eq!(ctx.scheme(), "https");
        assert!(ctx.is_secure());
        assert_eq!(ctx.cookies().len(), 1);
        assert_eq!(
            ctx.fingerprint(),
            &Fingerprint::from_cookies(&cookies(&[("authentik_proxy_session", "s1")]))
        );
    }

    #[test]
    fn test_request_context_keeps_original_url() {
        let url = Url::parse("http://example.com:80/a/../b").unwrap();
        let ctx = RequestContext::new(url, "example.com:80", Vec::new())
            .with_original_url("http://example.com:80/a/../b");

        assert_eq!(ctx.url().as_str(), "http://example.com/b");
        assert_eq!(ctx.original_url(), "http://example.com:80/a/../b");
    }
}
