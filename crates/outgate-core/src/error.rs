//! Error types for outgate-core

use http::{Method, StatusCode};
use thiserror::Error;

/// Result type alias for Outgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or mediating a request.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Configuration is missing a value or contains an invalid one.
    #[error("invalid config: {0}")]
    Config(String),

    /// The downstream request URL could not be reconstructed.
    #[error("invalid request url: {0}")]
    RequestUrl(String),

    /// The authenticator was unreachable or answered with something we
    /// cannot interpret as a verdict.
    #[error("authenticator request failed: {0}")]
    Authenticator(String),

    /// A provider-internal path was requested with a method other than GET.
    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    /// A provider-internal path that is never exposed downstream.
    #[error("path {0} is restricted")]
    PathRestricted(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an authenticator transport/protocol error.
    pub fn authenticator(message: impl Into<String>) -> Self {
        Self::Authenticator(message.into())
    }

    /// HTTP status reported to the downstream client for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::PathRestricted(_) => StatusCode::NOT_FOUND,
            Self::Config(_) | Self::RequestUrl(_) | Self::Authenticator(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::authenticator("unexpected response: 503");
        assert_eq!(
            e.to_string(),
            "authenticator request failed: unexpected response: 503"
        );
    }

    #[test]
    fn test_error_status() {
        assert_eq!(
            Error::MethodNotAllowed(Method::POST).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            Error::PathRestricted("/outpost.goauthentik.io".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::authenticator("boom").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::RequestUrl("bad".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
