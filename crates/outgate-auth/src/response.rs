//! Responses the mediator writes itself.

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderValue, StatusCode};

use outgate_core::namespace::{is_provider_header, start_url};
use outgate_core::{Error, RequestContext, Result, SessionRecord};

use crate::filter::{append_cookies, is_hop_by_hop};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Response for a request the policy refused.
///
/// Redirect statuses point the client at the start URL, carrying the exact
/// original URL. Session cookies are attached either way.
pub fn denied(status: StatusCode, ctx: &RequestContext, session: &SessionRecord) -> Result<Response> {
    let mut response = (
        status,
        [(CONTENT_TYPE, TEXT_PLAIN)],
        status.canonical_reason().unwrap_or_default(),
    )
        .into_response();

    if status.is_redirection() {
        let location = start_url(ctx.scheme(), ctx.host(), ctx.original_url())
            .map_err(|e| Error::RequestUrl(format!("failed to build start url: {e}")))?;
        let value = HeaderValue::from_str(location.as_str())
            .map_err(|e| Error::RequestUrl(format!("invalid start url {location}: {e}")))?;
        response.headers_mut().insert(LOCATION, value);
    }

    append_cookies(response.headers_mut(), &session.session_cookies);
    Ok(response)
}

/// Plain-text response for a mediation error.
pub fn error(err: &Error) -> Response {
    (err.status(), [(CONTENT_TYPE, TEXT_PLAIN)], err.to_string()).into_response()
}

/// Hand an authenticator passthrough response to the client.
///
/// Status and body are copied verbatim; provider and hop-by-hop headers are
/// not.
pub fn passthrough(forwarded: http::Response<Vec<u8>>) -> Response {
    let (parts, body) = forwarded.into_parts();

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = parts.status;

    let headers = response.headers_mut();
    for (name, value) in &parts.headers {
        if !is_provider_header(name) && !is_hop_by_hop(name) {
            headers.append(name.clone(), value.clone());
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use cookie::Cookie;
    use http::header::SET_COOKIE;
    use url::Url;

    fn ctx(url: &str) -> RequestContext {
        let url = Url::parse(url).unwrap();
        let host = url.host_str().unwrap().to_string();
        RequestContext::new(url, host, Vec::new())
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_denied_redirect_sets_location_and_cookies() {
        let session = SessionRecord::unauthenticated(vec![Cookie::new("authentik_proxy_csrf", "c")]);
        let response = denied(
            StatusCode::FOUND,
            &ctx("https://example.com/app?a=1&b=2"),
            &session,
        )
        .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[LOCATION],
            "https://example.com/outpost.goauthentik.io/start?rd=https%3A%2F%2Fexample.com%2Fapp%3Fa%3D1%26b%3D2"
        );
        assert_eq!(response.headers()[SET_COOKIE], "authentik_proxy_csrf=c");
        assert_eq!(body_text(response).await, "Found");
    }

    #[tokio::test]
    async fn test_denied_redirect_carries_unnormalized_original() {
        let url = Url::parse("http://example.com:80/a/../b?q=%7e").unwrap();
        let ctx = RequestContext::new(url, "example.com:80", Vec::new())
            .with_original_url("http://example.com:80/a/../b?q=%7e");

        let response = denied(StatusCode::FOUND, &ctx, &SessionRecord::default()).unwrap();

        assert_eq!(
            response.headers()[LOCATION],
            "http://example.com/outpost.goauthentik.io/start?rd=http%3A%2F%2Fexample.com%3A80%2Fa%2F..%2Fb%3Fq%3D%257e"
        );
    }

    #[tokio::test]
    async fn test_denied_non_redirect_has_no_location() {
        let response = denied(
            StatusCode::UNAUTHORIZED,
            &ctx("http://example.com/api"),
            &SessionRecord::default(),
        )
        .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(LOCATION).is_none());
        assert!(response.headers().get(SET_COOKIE).is_none());
        assert_eq!(response.headers()[CONTENT_TYPE], TEXT_PLAIN);
        assert_eq!(body_text(response).await, "Unauthorized");
    }

    #[tokio::test]
    async fn test_error_response() {
        let response = error(&Error::authenticator("connection refused"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_text(response).await,
            "authenticator request failed: connection refused"
        );

        let response = error(&Error::MethodNotAllowed(http::Method::POST));
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_passthrough_copies_status_body_and_safe_headers() {
        let mut forwarded = http::Response::new(b"<html>login</html>".to_vec());
        *forwarded.status_mut() = StatusCode::OK;
        let headers = forwarded.headers_mut();
        headers.insert("content-type", HeaderValue::from_static("text/html"));
        headers.insert("x-authentik-username", HeaderValue::from_static("alice"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.append(SET_COOKIE, HeaderValue::from_static("authentik_proxy_a=1"));
        headers.append(SET_COOKIE, HeaderValue::from_static("authentik_proxy_b=2"));

        let response = passthrough(forwarded);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/html");
        assert!(response.headers().get("x-authentik-username").is_none());
        assert!(response.headers().get("transfer-encoding").is_none());
        assert_eq!(response.headers().get_all(SET_COOKIE).iter().count(), 2);
        assert_eq!(body_text(response).await, "<html>login</html>");
    }
}
