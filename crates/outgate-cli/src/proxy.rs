//! Upstream HTTP proxy.
//!
//! The router's fallback handler: every request that makes it through the
//! forward-auth layer is replayed against the upstream base URL and the
//! answer copied back. Bodies are buffered.
//!
//! Paths with `.` or `..` segments (plain or percent-encoded) are refused:
//! the upstream URL would resolve them, so the upstream would serve a path
//! other than the one the policy classified.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use http::header::{CONTENT_LENGTH, HOST};
use http::{HeaderMap, HeaderName, Request, StatusCode, Uri};
use url::Url;

use outgate_auth::is_hop_by_hop;

/// Largest request body forwarded upstream.
const MAX_BODY: usize = 16 * 1024 * 1024;

const FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Errors from proxying a request upstream.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The request path has a `.` or `..` segment.
    #[error("dot segment in request path: {0}")]
    DotSegment(String),

    /// The upstream URL could not be built.
    #[error("invalid upstream url: {0}")]
    Target(#[from] url::ParseError),

    /// Reading the downstream request body failed.
    #[error("failed to read request body: {0}")]
    Body(#[from] axum::Error),

    /// The upstream request failed.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl ProxyError {
    /// HTTP status returned downstream for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::DotSegment(_) | Self::Target(_) => StatusCode::BAD_REQUEST,
            Self::Body(_) | Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// True if any segment of `path` is `.` or `..`, including `%2e` spellings.
fn has_dot_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| {
        let segment = segment.to_ascii_lowercase().replace("%2e", ".");
        segment == "." || segment == ".."
    })
}

/// The proxied service.
#[derive(Debug, Clone)]
pub struct Upstream {
    base: Url,
    http: reqwest::Client,
}

impl Upstream {
    /// Create an upstream rooted at `base`.
    pub fn new(base: Url, http: reqwest::Client) -> Self {
        Self { base, http }
    }

    /// The upstream base URL.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Map a downstream request URI onto the upstream.
    ///
    /// The path and query are appended to the base as sent.
    fn target(&self, uri: &Uri) -> Result<Url, ProxyError> {
        if has_dot_segment(uri.path()) {
            return Err(ProxyError::DotSegment(uri.path().to_string()));
        }

        let mut base = self.base.clone();
        base.set_query(None);
        base.set_fragment(None);
        let prefix = base.as_str().trim_end_matches('/');
        let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());

        Ok(Url::parse(&format!("{prefix}{path_and_query}"))?)
    }

    async fn send(&self, req: Request<Body>) -> Result<Response, ProxyError> {
        let (parts, body) = req.into_parts();
        let url = self.target(&parts.uri)?;
        let body = axum::body::to_bytes(body, MAX_BODY).await?;

        let mut headers = HeaderMap::with_capacity(parts.headers.len());
        for (name, value) in &parts.headers {
            if !is_hop_by_hop(name) && name != HOST && name != CONTENT_LENGTH {
                headers.append(name.clone(), value.clone());
            }
        }
        if let Some(host) = parts.headers.get(HOST) {
            headers.insert(FORWARDED_HOST, host.clone());
        }

        tracing::debug!(method = %parts.method, url = %url, "Proxying request upstream");

        let res = self
            .http
            .request(parts.method, url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = res.status();
        let res_headers = res.headers().clone();
        let bytes = res.bytes().await?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        let headers = response.headers_mut();
        for (name, value) in &res_headers {
            if !is_hop_by_hop(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        Ok(response)
    }
}

/// Fallback handler forwarding everything to the upstream.
pub async fn forward(State(upstream): State<Arc<Upstream>>, req: Request<Body>) -> Response {
    match upstream.send(req).await {
        Ok(response) => response,
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                tracing::warn!(error = %e, "Upstream request failed");
            } else {
                tracing::debug!(error = %e, "Refused to proxy request");
            }
            (status, e.to_string()).into_response()
        }
    }
}
