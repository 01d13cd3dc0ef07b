//! The authenticator protocol client.
//!
//! [`AuthentikClient`] performs the two calls the mediator needs:
//!
//! - [`check_session`](AuthentikClient::check_session) asks the auth check
//!   endpoint for a verdict on the request's session cookies, going through
//!   the session cache.
//! - [`forward`](AuthentikClient::forward) passes a provider-internal request
//!   (login, callback, sign out) through to the authenticator.
//!
//! Both replay the downstream session cookies, tell the authenticator which
//! host and URL the client asked for, and never follow redirects. Responses
//! are rewritten so they make sense to the downstream client: absolute
//! redirects to the authenticator's own origin are moved to the downstream
//! origin, and only provider session cookies survive, hardened with
//! `HttpOnly`, `Secure` and the configured SameSite policy.

use std::sync::Arc;

use cookie::{Cookie, SameSite};
use http::header::{COOKIE, LOCATION, SET_COOKIE};
use http::{HeaderMap, HeaderValue, StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;

use outgate_core::config::AuthentikConfig;
use outgate_core::namespace::{is_forwarded_header, is_session_cookie, BASE_PATH, CHECK_PATH};
use outgate_core::{Error, RequestContext, Result, SessionCache, SessionRecord};

/// Header carrying the downstream host.
pub const FORWARDED_HOST: &str = "x-forwarded-host";

/// Header carrying the full downstream URL.
pub const ORIGINAL_URI: &str = "x-original-uri";

/// Result of a session check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// The verdict.
    pub session: Arc<SessionRecord>,
    /// Whether the verdict came from the cache.
    pub cached: bool,
}

/// Client for the authenticator's outpost endpoints.
#[derive(Debug, Clone)]
pub struct AuthentikClient {
    address: String,
    cookie_policy: SameSite,
    http: reqwest::Client,
    cache: SessionCache,
}

impl AuthentikClient {
    /// Create a client from validated config.
    ///
    /// The session cache is bound to `lifetime`; cancel it on shutdown to
    /// stop background expiry.
    pub fn new(config: &AuthentikConfig, http: reqwest::Client, lifetime: CancellationToken) -> Self {
        Self::with_cache(
            &config.address,
            config.cookie_policy,
            http,
            SessionCache::new(config.cache_duration, lifetime),
        )
    }

    /// Create a client around an existing cache.
    pub fn with_cache(
        address: &str,
        cookie_policy: SameSite,
        http: reqwest::Client,
        cache: SessionCache,
    ) -> Self {
        Self {
            address: address.trim_end_matches('/').to_string(),
            cookie_policy,
            http,
            cache,
        }
    }

    /// Base address of the authenticator.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The session cache.
    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Get the verdict for the request's session.
    ///
    /// A cached verdict is returned without contacting the authenticator.
    /// Otherwise the auth check endpoint decides: `200` is authenticated,
    /// `401` is not, anything else is an error and nothing is cached.
    pub async fn check_session(&self, ctx: &RequestContext) -> Result<CheckResult> {
        let fingerprint = ctx.fingerprint();
        if let Some(session) = self.cache.get(fingerprint) {
            log::debug!("Session {fingerprint} served from cache");
            return Ok(CheckResult {
                session,
                cached: true,
            });
        }

        let (response, cookies) = self.request(CHECK_PATH, None, ctx).await?;

        let session = match response.status() {
            StatusCode::OK => SessionRecord::authenticated(forwarded_headers(response.headers()), cookies),
            StatusCode::UNAUTHORIZED => SessionRecord::unauthenticated(cookies),
            status => {
                return Err(Error::authenticator(format!(
                    "unexpected response: {}",
                    status.as_u16()
                )));
            }
        };

        log::debug!(
            "Session {fingerprint} checked: authenticated={}",
            session.authenticated
        );

        let session = Arc::new(session);
        self.cache.set(fingerprint, Arc::clone(&session));

        Ok(CheckResult {
            session,
            cached: false,
        })
    }

    /// Pass a provider-internal request through to the authenticator.
    ///
    /// Provider-internal endpoints can change the session (login, logout),
    /// so any cached verdict for the request's cookies is dropped first.
    /// The returned response has its `Location` and `Set-Cookie` headers
    /// rewritten for the downstream client; status and body are verbatim.
    ///
    /// The body is read whole before it is handed back. Authenticator pages
    /// are small, and streaming would need reqwest's `stream` feature.
    pub async fn forward(
        &self,
        path: &str,
        query: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<http::Response<Vec<u8>>> {
        self.cache.delete(ctx.fingerprint());

        let (response, _) = self.request(path, query, ctx).await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::authenticator(format!("failed to read response body: {e}")))?;

        let mut forwarded = http::Response::new(body.to_vec());
        *forwarded.status_mut() = status;
        *forwarded.headers_mut() = headers;
        Ok(forwarded)
    }

    async fn request(
        &self,
        path: &str,
        query: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<(reqwest::Response, Vec<Cookie<'static>>)> {
        let mut url = format!("{}{path}", self.address);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }

        let mut request = self
            .http
            .get(&url)
            .header(FORWARDED_HOST, ctx.host())
            .header(ORIGINAL_URI, ctx.original_url());

        if !ctx.cookies().is_empty() {
            request = request.header(COOKIE, cookie_header(ctx.cookies()));
        }

        let mut response = request
            .send()
            .await
            .map_err(|e| Error::authenticator(e.to_string()))?;

        self.rewrite_location(response.headers_mut(), ctx)?;
        let cookies = self.rewrite_cookies(response.headers_mut(), ctx.is_secure());

        Ok((response, cookies))
    }

    /// Move absolute redirects to the authenticator's outpost paths onto the
    /// downstream origin, keeping path and query untouched.
    fn rewrite_location(&self, headers: &mut HeaderMap, ctx: &RequestContext) -> Result<()> {
        let Some(location) = headers.get(LOCATION) else {
            headers.remove(LOCATION);
            return Ok(());
        };

        // Opaque (non-ASCII) values can't point at the authenticator address.
        let Ok(location) = location.to_str() else {
            return Ok(());
        };
        if location.is_empty() {
            headers.remove(LOCATION);
            return Ok(());
        }

        let Some(rest) = location
            .strip_prefix(self.address.as_str())
            .filter(|rest| rest.starts_with(BASE_PATH))
        else {
            return Ok(());
        };

        let rewritten = format!("{}://{}{rest}", ctx.scheme(), ctx.host());
        Url::parse(&rewritten)
            .map_err(|e| Error::authenticator(format!("invalid location {location}: {e}")))?;
        let value = HeaderValue::from_str(&rewritten)
            .map_err(|e| Error::authenticator(format!("invalid location {rewritten}: {e}")))?;

        log::debug!("Rewrote authenticator redirect to {rewritten}");
        headers.insert(LOCATION, value);
        Ok(())
    }

    /// Keep only provider session cookies, hardened for the downstream client.
    fn rewrite_cookies(&self, headers: &mut HeaderMap, secure: bool) -> Vec<Cookie<'static>> {
        let cookies: Vec<Cookie<'static>> = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| Cookie::parse(value.to_string()).ok())
            .filter(|cookie| is_session_cookie(cookie.name()))
            .map(|mut cookie| {
                cookie.set_http_only(true);
                cookie.set_secure(secure);
                cookie.set_same_site(self.cookie_policy);
                cookie
            })
            .collect();

        headers.remove(SET_COOKIE);
        for cookie in &cookies {
            if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
                headers.append(SET_COOKIE, value);
            }
        }

        cookies
    }
}

/// Authenticator headers to forward upstream.
fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::new();
    for (name, value) in headers {
        if is_forwarded_header(name) {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}

/// Render cookies as a `Cookie` request header value.
fn cookie_header(cookies: &[Cookie<'_>]) -> String {
    cookies
        .iter()
        .map(|c| c.stripped().to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
