//! Inbound request handling: URL reconstruction, cookie extraction and
//! stripping of provider artifacts.

use cookie::Cookie;
use http::header::{COOKIE, HOST};
use http::uri::Scheme;
use http::{HeaderMap, HeaderName, HeaderValue, Request};
use url::Url;

use outgate_core::namespace::{is_provider_cookie, is_provider_header, is_session_cookie};
use outgate_core::{Error, RequestContext, Result};

/// Build the [`RequestContext`] for an inbound request.
///
/// The scheme comes from a [`Scheme`] request extension when the server set
/// one (TLS termination), else from the request URI, else `http`. The host
/// comes from the `Host` header, falling back to the URI authority.
pub fn request_context<B>(req: &Request<B>) -> Result<RequestContext> {
    let scheme = req
        .extensions()
        .get::<Scheme>()
        .or_else(|| req.uri().scheme())
        .map(|s| s.as_str().to_ascii_lowercase())
        .unwrap_or_else(|| "http".to_string());

    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
        .ok_or_else(|| Error::RequestUrl("request has no host".to_string()))?
        .to_string();

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let raw = format!("{scheme}://{host}{path_and_query}");
    let url = Url::parse(&raw).map_err(|e| Error::RequestUrl(format!("{raw}: {e}")))?;

    Ok(RequestContext::new(url, host, session_cookies(req.headers())).with_original_url(raw))
}

/// Split `Cookie` header values into trimmed, non-empty `name=value` pairs.
///
/// Works on raw bytes so one non-ASCII value does not hide the rest of the
/// line.
fn cookie_pairs(headers: &HeaderMap) -> impl Iterator<Item = &[u8]> {
    headers
        .get_all(COOKIE)
        .iter()
        .flat_map(|v| v.as_bytes().split(|b| *b == b';'))
        .map(<[u8]>::trim_ascii)
        .filter(|pair| !pair.is_empty())
}

fn cookie_name(pair: &[u8]) -> &[u8] {
    pair.iter()
        .position(|b| *b == b'=')
        .map_or(pair, |at| &pair[..at])
        .trim_ascii()
}

/// Collect the authenticator session cookies sent by the client.
pub fn session_cookies(headers: &HeaderMap) -> Vec<Cookie<'static>> {
    cookie_pairs(headers)
        .filter_map(|pair| std::str::from_utf8(pair).ok())
        .filter_map(|pair| Cookie::parse(pair.to_string()).ok())
        .filter(|c| is_session_cookie(c.name()))
        .collect()
}

/// Remove provider headers and cookies so the upstream never sees them.
///
/// Non-provider cookies are kept byte for byte and folded into a single
/// `Cookie` header.
pub fn strip_provider_artifacts(headers: &mut HeaderMap) {
    let provider: Vec<HeaderName> = headers
        .keys()
        .filter(|name| is_provider_header(name))
        .cloned()
        .collect();
    for name in provider {
        headers.remove(&name);
    }

    if !headers.contains_key(COOKIE) {
        return;
    }

    let kept: Vec<&[u8]> = cookie_pairs(headers)
        .filter(|pair| !std::str::from_utf8(cookie_name(pair)).is_ok_and(is_provider_cookie))
        .collect();
    let joined = kept.join(&b"; "[..]);

    headers.remove(COOKIE);
    if joined.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_bytes(&joined) {
        headers.insert(COOKIE, value);
    }
}
