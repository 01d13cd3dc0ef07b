//! Forward-auth Tower middleware.
//!
//! `ForwardAuthLayer` and `ForwardAuthService` put the authenticator in front
//! of any inner service. Every request is stripped of provider headers and
//! cookies first. Then:
//!
//! - paths under the provider prefix are served by the authenticator
//!   (GET only, internal endpoints hidden);
//! - skipped paths go straight to the inner service;
//! - everything else is checked against the authenticator and the path
//!   policy, and either reaches the inner service with the identity headers
//!   injected, or is denied/redirected.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::{Method, Request};
use tower::{Layer, Service};

use outgate_authentik::{AuthentikClient, CheckResult};
use outgate_core::namespace::{is_path_exposed, is_provider_path};
use outgate_core::{Error, PathPolicy, Result};

use crate::filter::ResponseFilter;
use crate::request::{request_context, strip_provider_artifacts};
use crate::response;

/// Tower `Layer` that wraps services with forward authentication.
#[derive(Clone)]
pub struct ForwardAuthLayer {
    client: Arc<AuthentikClient>,
    policy: Arc<PathPolicy>,
}

impl ForwardAuthLayer {
    /// Create a new layer from an authenticator client and a path policy.
    pub fn new(client: Arc<AuthentikClient>, policy: PathPolicy) -> Self {
        Self {
            client,
            policy: Arc::new(policy),
        }
    }
}

impl<S> Layer<S> for ForwardAuthLayer {
    type Service = ForwardAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ForwardAuthService {
            inner,
            client: self.client.clone(),
            policy: self.policy.clone(),
        }
    }
}

/// Tower `Service` that mediates every request through the authenticator.
#[derive(Clone)]
pub struct ForwardAuthService<S> {
    inner: S,
    client: Arc<AuthentikClient>,
    policy: Arc<PathPolicy>,
}

impl<S> Service<Request<Body>> for ForwardAuthService<S>
where
    S: Service<Request<Body>, Error = Infallible> + Clone + Send + 'static,
    S::Response: IntoResponse,
    S::Future: Send,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        let client = self.client.clone();
        let policy = self.policy.clone();

        Box::pin(async move {
            let method = req.method().clone();
            let path = req.uri().path().to_string();

            match mediate(&client, &policy, inner, req).await {
                Ok(resp) => Ok(resp),
                Err(err) => {
                    if err.status().is_server_error() {
                        log::warn!("Forward auth failed for {method} {path}: {err}");
                    } else {
                        log::debug!("Rejected {method} {path}: {err}");
                    }
                    Ok(response::error(&err))
                }
            }
        })
    }
}

async fn mediate<S>(
    client: &AuthentikClient,
    policy: &PathPolicy,
    inner: S,
    mut req: Request<Body>,
) -> Result<Response>
where
    S: Service<Request<Body>, Error = Infallible>,
    S::Response: IntoResponse,
{
    let ctx = request_context(&req)?;
    strip_provider_artifacts(req.headers_mut());

    let path = req.uri().path().to_string();

    if is_provider_path(&path) {
        if req.method() != Method::GET {
            return Err(Error::MethodNotAllowed(req.method().clone()));
        }
        if !is_path_exposed(&path) {
            return Err(Error::PathRestricted(path));
        }
        let query = req.uri().query().map(str::to_string);
        log::debug!("Passing {path} through to the authenticator");
        let forwarded = client.forward(&path, query.as_deref(), &ctx).await?;
        return Ok(response::passthrough(forwarded));
    }

    if policy.is_skipped(&path) {
        log::debug!("Skipping authentication for {path}");
        return Ok(upstream(inner, req, &ResponseFilter::default()).await);
    }

    let CheckResult { session, cached } = client.check_session(&ctx).await?;
    let outcome = policy.classify(&path);

    log::debug!(
        "Session {} for {path}: authenticated={} cached={cached} outcome={outcome:?}",
        ctx.fingerprint(),
        session.authenticated,
    );

    if outcome.is_allow() || session.authenticated {
        let headers = req.headers_mut();
        for (name, value) in &session.forwarded_headers {
            headers.append(name.clone(), value.clone());
        }
        let filter = ResponseFilter::new(session.session_cookies.clone());
        return Ok(upstream(inner, req, &filter).await);
    }

    response::denied(outcome.status(), &ctx, &session)
}

async fn upstream<S>(mut inner: S, req: Request<Body>, filter: &ResponseFilter) -> Response
where
    S: Service<Request<Body>, Error = Infallible>,
    S::Response: IntoResponse,
{
    let mut resp = inner
        .call(req)
        .await
        .unwrap_or_else(|infallible| match infallible {})
        .into_response();
    filter.apply(resp.headers_mut());
    resp
}
