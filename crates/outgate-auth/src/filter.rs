//! Response filtering for requests that reach the upstream.

use cookie::Cookie;
use http::header::SET_COOKIE;
use http::{HeaderMap, HeaderName, HeaderValue};

use outgate_core::namespace::{is_provider_cookie, is_provider_header};

/// Whether a header is connection-specific and never copied between hops.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Filter applied to upstream responses.
///
/// Removes every provider header and provider cookie the upstream emits,
/// then appends the session cookies issued by the authenticator.
#[derive(Debug, Clone, Default)]
pub struct ResponseFilter {
    session_cookies: Vec<Cookie<'static>>,
}

impl ResponseFilter {
    /// Create a filter that appends the given session cookies.
    pub fn new(session_cookies: Vec<Cookie<'static>>) -> Self {
        Self { session_cookies }
    }

    /// Apply the filter to response headers.
    pub fn apply(&self, headers: &mut HeaderMap) {
        let provider: Vec<HeaderName> = headers
            .keys()
            .filter(|name| is_provider_header(name))
            .cloned()
            .collect();
        for name in provider {
            headers.remove(&name);
        }

        let kept: Vec<HeaderValue> = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter(|value| keep_set_cookie(value))
            .cloned()
            .collect();
        headers.remove(SET_COOKIE);
        for value in kept {
            headers.append(SET_COOKIE, value);
        }

        append_cookies(headers, &self.session_cookies);
    }
}

/// Append cookies as `Set-Cookie` headers.
pub fn append_cookies(headers: &mut HeaderMap, cookies: &[Cookie<'static>]) {
    for cookie in cookies {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(e) => log::warn!("Dropping unencodable cookie {}: {e}", cookie.name()),
        }
    }
}

fn keep_set_cookie(value: &HeaderValue) -> bool {
    let Ok(value) = value.to_str() else {
        return false;
    };
    let name = value
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(name, _)| name.trim())
        .unwrap_or_default();
    !name.is_empty() && !is_provider_cookie(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cookie::SameSite;
    use http::header;

    fn set_cookies(headers: &HeaderMap) -> Vec<String> {
        headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_filter_removes_provider_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-authentik-username", HeaderValue::from_static("alice"));
        headers.insert("content-type", HeaderValue::from_static("text/html"));

        ResponseFilter::default().apply(&mut headers);

        assert!(headers.get("x-authentik-username").is_none());
        assert_eq!(headers["content-type"], "text/html");
    }

    #[test]
    fn test_filter_drops_provider_and_unnamed_cookies() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("app=1; Path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("authentik_proxy_session=forged"));
        headers.append(SET_COOKIE, HeaderValue::from_static("=nameless"));
        headers.append(SET_COOKIE, HeaderValue::from_static("garbage"));

        ResponseFilter::default().apply(&mut headers);

        assert_eq!(set_cookies(&headers), vec!["app=1; Path=/"]);
    }

    #[test]
    fn test_filter_appends_session_cookies() {
        let mut cookie = Cookie::new("authentik_proxy_session", "sess1");
        cookie.set_http_only(true);
        cookie.set_same_site(SameSite::Lax);

        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("app=1"));

        ResponseFilter::new(vec![cookie]).apply(&mut headers);

        let cookies = set_cookies(&headers);
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0], "app=1");
        assert!(cookies[1].starts_with("authentik_proxy_session=sess1"));
        assert!(cookies[1].contains("HttpOnly"));
        assert!(cookies[1].contains("SameSite=Lax"));
    }

    #[test]
    fn test_is_hop_by_hop() {
        assert!(is_hop_by_hop(&header::TRANSFER_ENCODING));
        assert!(is_hop_by_hop(&header::CONNECTION));
        assert!(is_hop_by_hop(&HeaderName::from_static("keep-alive")));
        assert!(!is_hop_by_hop(&header::CONTENT_TYPE));
        assert!(!is_hop_by_hop(&header::CONTENT_LENGTH));
    }
}
