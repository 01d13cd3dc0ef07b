//! Outgate authentik: the outpost protocol client.
//!
//! This crate talks to the authenticator on behalf of the mediator: it asks
//! for session verdicts, passes provider-internal requests through, and
//! rewrites what comes back so it is safe to hand to the downstream client.
//!
//! # Modules
//!
//! - [`client`]: [`AuthentikClient`], session checks and passthrough
//! - [`transport`]: Transport construction from [`HttpClientConfig`](outgate_core::HttpClientConfig)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod client;
pub mod transport;

pub use client::{AuthentikClient, CheckResult};
pub use transport::build_http_client;
