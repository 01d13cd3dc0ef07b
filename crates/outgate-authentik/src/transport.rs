//! HTTP transport for talking to the authenticator.

use std::path::Path;

use outgate_core::config::{HttpClientConfig, TlsVersion};
use outgate_core::{Error, Result};
use reqwest::redirect::Policy;
use reqwest::tls::{Certificate, Identity, Version};

/// Build the HTTP client used for authenticator requests.
///
/// The client never follows redirects: callers act on the raw 3xx the
/// authenticator returns.
pub fn build_http_client(config: &HttpClientConfig) -> Result<reqwest::Client> {
    let tls = &config.tls;

    let mut builder = reqwest::Client::builder()
        .redirect(Policy::none())
        .min_tls_version(tls_version(tls.min_version))
        .max_tls_version(tls_version(tls.max_version))
        .danger_accept_invalid_certs(tls.insecure_skip_verify);

    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(ca) = &tls.ca {
        for cert in load_ca_bundle(ca)? {
            builder = builder.add_root_certificate(cert);
        }
    }

    if let Some(identity) = &tls.client_identity {
        builder = builder.identity(load_identity(&identity.cert, &identity.key)?);
    }

    builder
        .build()
        .map_err(|e| Error::config(format!("failed to create http client: {e}")))
}

fn tls_version(version: TlsVersion) -> Version {
    match version {
        TlsVersion::Tls10 => Version::TLS_1_0,
        TlsVersion::Tls11 => Version::TLS_1_1,
        TlsVersion::Tls12 => Version::TLS_1_2,
        TlsVersion::Tls13 => Version::TLS_1_3,
    }
}

fn load_ca_bundle(path: &Path) -> Result<Vec<Certificate>> {
    let pem = std::fs::read(path).map_err(|e| {
        Error::config(format!(
            "failed to load ca certificate {}: {e}",
            path.display()
        ))
    })?;

    let certs = Certificate::from_pem_bundle(&pem).map_err(|e| {
        Error::config(format!(
            "failed to parse ca certificate {}: {e}",
            path.display()
        ))
    })?;
    if certs.is_empty() {
        return Err(Error::config(format!(
            "failed to parse ca certificate {}: no certificates found",
            path.display()
        )));
    }

    Ok(certs)
}

fn load_identity(cert: &Path, key: &Path) -> Result<Identity> {
    let read = |path: &Path| {
        std::fs::read(path).map_err(|e| {
            Error::config(format!(
                "failed to load client certificate {}: {e}",
                path.display()
            ))
        })
    };

    let mut pem = read(cert)?;
    pem.push(b'\n');
    pem.extend(read(key)?);

    Identity::from_pem(&pem)
        .map_err(|e| Error::config(format!("failed to load client certificate: {e}")))
}
