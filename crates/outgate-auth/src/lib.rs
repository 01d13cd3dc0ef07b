//! Outgate auth: forward authentication as Tower middleware.
//!
//! [`ForwardAuthLayer`] wraps any axum-compatible service and mediates each
//! request through the authenticator: provider endpoints are passed through,
//! application paths are checked and then either forwarded with the
//! authenticated identity or denied/redirected according to the
//! [`PathPolicy`](outgate_core::PathPolicy).
//!
//! # Modules
//!
//! - [`middleware`]: The layer and service
//! - [`request`]: Request context extraction and provider artifact stripping
//! - [`filter`]: Upstream response filter
//! - [`response`]: Denied, error and passthrough responses

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod filter;
pub mod middleware;
pub mod request;
pub mod response;

pub use filter::{ResponseFilter, is_hop_by_hop};
pub use middleware::{ForwardAuthLayer, ForwardAuthService};
pub use request::{request_context, strip_provider_artifacts};
