//! Outgate Core: shared types for the forward-auth proxy.
//!
//! This crate has no internal Outgate dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`config`]: Raw configuration, defaults and validation
//! - [`namespace`]: The authenticator's reserved paths, headers and cookies
//! - [`policy`]: Longest-match path classification
//! - [`session`]: Session records, fingerprints and request context
//! - [`cache`]: Verdict cache with per-entry expiry

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod config;
pub mod error;
pub mod namespace;
pub mod policy;
pub mod session;

// Re-export key types at crate root for convenience
pub use cache::SessionCache;
pub use config::{AuthentikConfig, Config, HttpClientConfig, RawConfig, TlsConfig, TlsVersion};
pub use error::{Error, Result};
pub use policy::{Outcome, PathPolicy};
pub use session::{Fingerprint, RequestContext, SessionRecord};
