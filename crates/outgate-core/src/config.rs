//! Configuration loading and validation.
//!
//! [`RawConfig`] is what users write (a TOML file for the `outgate` binary).
//! [`RawConfig::parse`] applies defaults and validates everything up front,
//! producing a [`Config`] that request handling can use without further
//! checks.
//!
//! ```toml
//! address = "http://authentik-outpost:9000"
//! cookie_policy = "lax"
//! unauthorized_status_code = 401
//! redirect_status_code = 302
//! unauthorized_paths = ["^/api/.*"]
//! redirect_paths = ["^/.*"]
//! cache_duration = "5m"
//! timeout = "10s"
//!
//! [tls]
//! min_version = 12
//! max_version = 13
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use cookie::SameSite;
use http::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::policy::{compile_patterns, PathPolicy};

/// Default SameSite policy for issued session cookies.
pub const DEFAULT_COOKIE_POLICY: &str = "lax";

/// Default status for unauthenticated requests on deny paths.
pub const DEFAULT_UNAUTHORIZED_STATUS_CODE: u16 = 401;

/// Default status for unauthenticated requests on redirect paths.
pub const DEFAULT_REDIRECT_STATUS_CODE: u16 = 302;

/// Default deny patterns: every path requires authentication.
pub const DEFAULT_UNAUTHORIZED_PATHS: &[&str] = &["^/.*$"];

/// Default cache duration (caching disabled).
pub const DEFAULT_CACHE_DURATION: &str = "0s";

/// Default transport timeout (no timeout).
pub const DEFAULT_TIMEOUT: &str = "0s";

// ============================================================================
// Raw configuration
// ============================================================================

/// User-facing configuration, before defaults and validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    /// Base address of the authenticator (e.g. `http://outpost:9000`).
    pub address: String,

    /// SameSite policy for issued cookies: `none`, `lax` or `strict`.
    pub cookie_policy: Option<String>,

    /// Status for unauthenticated requests on deny paths.
    pub unauthorized_status_code: Option<u16>,

    /// Status for unauthenticated requests on redirect paths.
    pub redirect_status_code: Option<u16>,

    /// Paths that bypass the authenticator.
    pub skipped_paths: Vec<String>,

    /// Deny rule patterns.
    pub unauthorized_paths: Option<Vec<String>>,

    /// Redirect rule patterns.
    pub redirect_paths: Vec<String>,

    /// How long verdicts are cached (`0s` disables the cache).
    pub cache_duration: Option<String>,

    /// Authenticator request timeout (`0s` means none).
    pub timeout: Option<String>,

    /// TLS settings for the authenticator connection.
    pub tls: RawTlsConfig,
}

/// User-facing TLS settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawTlsConfig {
    /// Path to a PEM CA bundle.
    pub ca: Option<PathBuf>,

    /// Path to a PEM client certificate.
    pub cert: Option<PathBuf>,

    /// Path to the PEM private key of the client certificate.
    pub key: Option<PathBuf>,

    /// Minimum TLS version (10=1.0, 11=1.1, 12=1.2, 13=1.3).
    pub min_version: Option<u8>,

    /// Maximum TLS version (10=1.0, 11=1.1, 12=1.2, 13=1.3).
    pub max_version: Option<u8>,

    /// Skip certificate verification.
    pub insecure_skip_verify: bool,
}

impl RawConfig {
    /// Read a raw configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))
    }

    /// Parse a raw configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(e.to_string()))
    }

    /// Apply defaults and validate.
    pub fn parse(&self) -> Result<Config> {
        Ok(Config {
            authentik: self.parse_authentik()?,
            http_client: self.parse_http_client()?,
        })
    }

    fn parse_authentik(&self) -> Result<AuthentikConfig> {
        let address = parse_address(&self.address)?;

        let cookie_policy = parse_cookie_policy(
            self.cookie_policy
                .as_deref()
                .unwrap_or(DEFAULT_COOKIE_POLICY),
        )?;

        let unauthorized_status = parse_status(
            "unauthorized_status_code",
            self.unauthorized_status_code
                .unwrap_or(DEFAULT_UNAUTHORIZED_STATUS_CODE),
        )?;
        let redirect_status = parse_status(
            "redirect_status_code",
            self.redirect_status_code
                .unwrap_or(DEFAULT_REDIRECT_STATUS_CODE),
        )?;

        let unauthorized_paths = match &self.unauthorized_paths {
            Some(paths) => paths.clone(),
            None => DEFAULT_UNAUTHORIZED_PATHS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
        };

        let policy = PathPolicy::new(
            compile_patterns("unauthorized_paths", &unauthorized_paths)?,
            unauthorized_status,
            compile_patterns("redirect_paths", &self.redirect_paths)?,
            redirect_status,
        )
        .with_skipped(compile_patterns("skipped_paths", &self.skipped_paths)?);

        let cache_duration = parse_duration(
            "cache_duration",
            self.cache_duration
                .as_deref()
                .unwrap_or(DEFAULT_CACHE_DURATION),
        )?;

        Ok(AuthentikConfig {
            address,
            cookie_policy,
            policy,
            cache_duration,
        })
    }

    fn parse_http_client(&self) -> Result<HttpClientConfig> {
        let timeout = parse_duration(
            "timeout",
            self.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT),
        )?;

        Ok(HttpClientConfig {
            timeout: (!timeout.is_zero()).then_some(timeout),
            tls: self.tls.parse()?,
        })
    }
}

impl RawTlsConfig {
    fn parse(&self) -> Result<TlsConfig> {
        let min_version = match self.min_version {
            Some(v) => TlsVersion::from_config(v)
                .ok_or_else(|| Error::config("tls.min_version is not valid"))?,
            None => TlsVersion::Tls12,
        };
        let max_version = match self.max_version {
            Some(v) => TlsVersion::from_config(v)
                .ok_or_else(|| Error::config("tls.max_version is not valid"))?,
            None => TlsVersion::Tls13,
        };

        if min_version > max_version {
            return Err(Error::config(
                "tls.min_version cannot be higher than tls.max_version",
            ));
        }

        let client_identity = match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => Some(ClientIdentity {
                cert: cert.clone(),
                key: key.clone(),
            }),
            (None, None) => None,
            _ => {
                return Err(Error::config(
                    "both tls.cert and tls.key must be provided for client certificate authentication",
                ));
            }
        };

        Ok(TlsConfig {
            ca: self.ca.clone(),
            client_identity,
            min_version,
            max_version,
            insecure_skip_verify: self.insecure_skip_verify,
        })
    }
}

// ============================================================================
// Parsed configuration
// ============================================================================

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Authenticator protocol settings.
    pub authentik: AuthentikConfig,
    /// Transport settings for talking to the authenticator.
    pub http_client: HttpClientConfig,
}

impl Config {
    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        RawConfig::from_file(path)?.parse()
    }
}

/// Authenticator protocol settings.
#[derive(Debug, Clone)]
pub struct AuthentikConfig {
    /// Base address, without trailing slash.
    pub address: String,
    /// SameSite policy applied to issued session cookies.
    pub cookie_policy: SameSite,
    /// Path rules.
    pub policy: PathPolicy,
    /// Verdict cache TTL (zero disables the cache).
    pub cache_duration: Duration,
}

/// Transport settings.
#[derive(Debug, Clone, Default)]
pub struct HttpClientConfig {
    /// Per-request timeout; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// TLS settings.
    pub tls: TlsConfig,
}

/// TLS settings.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// PEM CA bundle added to the trust roots.
    pub ca: Option<PathBuf>,
    /// Client certificate for mutual TLS.
    pub client_identity: Option<ClientIdentity>,
    /// Lowest accepted protocol version.
    pub min_version: TlsVersion,
    /// Highest accepted protocol version.
    pub max_version: TlsVersion,
    /// Skip certificate verification.
    pub insecure_skip_verify: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            ca: None,
            client_identity: None,
            min_version: TlsVersion::Tls12,
            max_version: TlsVersion::Tls13,
            insecure_skip_verify: false,
        }
    }
}

/// PEM files of a client certificate and its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Certificate chain.
    pub cert: PathBuf,
    /// Private key.
    pub key: PathBuf,
}

/// TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.0
    Tls10,
    /// TLS 1.1
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Map the config notation (10..=13) to a version.
    pub fn from_config(value: u8) -> Option<Self> {
        match value {
            10 => Some(Self::Tls10),
            11 => Some(Self::Tls11),
            12 => Some(Self::Tls12),
            13 => Some(Self::Tls13),
            _ => None,
        }
    }
}

// ============================================================================
// Field parsers
// ============================================================================

fn parse_address(address: &str) -> Result<String> {
    let address = address.trim().trim_end_matches('/');
    if address.is_empty() {
        return Err(Error::config("address is required"));
    }

    let url = Url::parse(address)
        .map_err(|e| Error::config(format!("address is not valid: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::config(format!(
            "address is not valid: {address} is not an http(s) url"
        )));
    }

    Ok(address.to_string())
}

fn parse_cookie_policy(policy: &str) -> Result<SameSite> {
    match policy.to_ascii_lowercase().as_str() {
        "none" => Ok(SameSite::None),
        "lax" => Ok(SameSite::Lax),
        "strict" => Ok(SameSite::Strict),
        other => Err(Error::config(format!("cookie_policy is not valid: {other}"))),
    }
}

fn parse_status(name: &str, code: u16) -> Result<StatusCode> {
    StatusCode::from_u16(code)
        .ok()
        .filter(|s| (100..600).contains(&s.as_u16()))
        .ok_or_else(|| Error::config(format!("{name} is not valid: {code}")))
}

fn parse_duration(name: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim())
        .map_err(|e| Error::config(format!("{name} is not valid: {e}")))
}
