//! The authenticator's reserved path, header and cookie namespaces.
//!
//! Everything the authenticator uses for its own protocol lives under a fixed
//! prefix: paths under [`BASE_PATH`], headers starting with [`HEADER_PREFIX`]
//! and cookies starting with [`COOKIE_PREFIX`]. These helpers decide what is
//! provider-internal and what is exposed to the downstream client.

use http::HeaderName;
use url::Url;

/// Path prefix reserved by the authenticator.
pub const BASE_PATH: &str = "/outpost.goauthentik.io";

/// Login entry point; unauthenticated clients are redirected here.
pub const START_PATH: &str = "/outpost.goauthentik.io/start";

/// Auth endpoints, never exposed downstream.
pub const AUTH_PATH: &str = "/outpost.goauthentik.io/auth";

/// The auth check endpoint.
pub const CHECK_PATH: &str = "/outpost.goauthentik.io/auth/nginx";

/// Prefix of authenticator headers (lowercase, as stored by `http`).
pub const HEADER_PREFIX: &str = "x-authentik-";

/// Prefix of authenticator session cookies.
pub const COOKIE_PREFIX: &str = "authentik_proxy_";

/// Query parameter carrying the original URL on the start redirect.
pub const REDIRECT_PARAM: &str = "rd";

/// Whether a request path belongs to the authenticator's reserved namespace.
pub fn is_provider_path(path: &str) -> bool {
    path.strip_prefix(BASE_PATH)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Whether a provider path may be passed through to the downstream client.
///
/// The bare prefix and everything under `auth` are internal to the
/// forward-auth protocol and answer 404.
pub fn is_path_exposed(path: &str) -> bool {
    path != BASE_PATH && !path.starts_with(AUTH_PATH)
}

/// Whether a header belongs to the authenticator namespace.
pub fn is_provider_header(name: &HeaderName) -> bool {
    name.as_str().starts_with(HEADER_PREFIX)
}

/// Whether a header is one the authenticator hands out for forwarding.
///
/// Unlike [`is_provider_header`] this rejects the bare prefix.
pub fn is_forwarded_header(name: &HeaderName) -> bool {
    let name = name.as_str();
    name.len() > HEADER_PREFIX.len() && name.starts_with(HEADER_PREFIX)
}

/// Whether a cookie name belongs to the authenticator namespace.
pub fn is_provider_cookie(name: &str) -> bool {
    name.starts_with(COOKIE_PREFIX)
}

/// Whether a cookie is an actual authenticator session cookie.
pub fn is_session_cookie(name: &str) -> bool {
    name.len() > COOKIE_PREFIX.len() && name.starts_with(COOKIE_PREFIX)
}

/// Build the start URL for a downstream request.
///
/// The result lives on the downstream origin (`scheme://host`) and carries
/// `original`, the exact URL the client asked for, in the `rd` query
/// parameter.
pub fn start_url(scheme: &str, host: &str, original: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&format!("{scheme}://{host}{START_PATH}"))?;
    url.query_pairs_mut().append_pair(REDIRECT_PARAM, original);
    Ok(url)
}
