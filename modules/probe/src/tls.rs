//! Best-effort certificate expiry inspection for https targets.

use anyhow::{anyhow, Result};
use pulse_core::SslInfo;
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;
use url::Url;

const SECS_PER_DAY: i64 = 86_400;

/// Expiry of the leaf certificate as far as it could be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertExpiry {
    At(OffsetDateTime),
    Raw(String),
    Missing,
}

/// True when the scheme is `https`, ignoring case. Works on unparseable input too.
pub fn is_https(url: &str) -> bool {
    url.trim().get(..6).map_or(false, |s| s.eq_ignore_ascii_case("https:"))
}

/// Connect to the URL's host (port 443 unless given), complete a TLS
/// handshake within `budget` and report the leaf certificate's expiry.
/// Never fails: every problem is folded into the returned `SslInfo`.
pub async fn inspect_tls(url: &str, budget: Duration) -> SslInfo {
    let Some((host, port)) = tls_target(url) else {
        return SslInfo::no_hostname();
    };
    match timeout(budget, leaf_expiry(&host, port)).await {
        Ok(Ok(expiry)) => ssl_from_expiry(expiry, OffsetDateTime::now_utc()),
        Ok(Err(e)) => {
            debug!(host = %host, port, error = %e, "tls inspection failed");
            SslInfo::failed(format!("{:#}", e))
        }
        Err(_) => SslInfo::failed(format!("tls handshake timed out after {}s", budget.as_secs())),
    }
}

/// Classify an expiry relative to `now`.
pub fn ssl_from_expiry(expiry: CertExpiry, now: OffsetDateTime) -> SslInfo {
    match expiry {
        CertExpiry::At(at) => match at.format(&Rfc3339) {
            Ok(iso) => {
                let left = at - now;
                SslInfo {
                    ssl_valid: Some(left.is_positive()),
                    ssl_error: None,
                    ssl_expires_at: Some(iso),
                    ssl_days_left: Some(left.whole_seconds().div_euclid(SECS_PER_DAY)),
                }
            }
            Err(_) => ssl_from_expiry(CertExpiry::Raw(at.to_string()), now),
        },
        CertExpiry::Raw(raw) => SslInfo { ssl_valid: None, ssl_expires_at: Some(raw), ..Default::default() },
        // handshake verified the chain, only the expiry is unknown
        CertExpiry::Missing => SslInfo { ssl_valid: Some(true), ..Default::default() },
    }
}

fn tls_target(url: &str) -> Option<(String, u16)> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), parsed.port().unwrap_or(443)))
}

async fn leaf_expiry(host: &str, port: u16) -> Result<CertExpiry> {
    // Ensure a crypto provider is installed (ring)
    let _ = rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider());
    let stream = TcpStream::connect((host, port)).await?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder().with_root_certificates(root_store).with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));
    let server_name = match host.parse::<std::net::IpAddr>() {
        Ok(ip) => rustls::pki_types::ServerName::IpAddress(ip.into()),
        Err(_) => rustls::pki_types::ServerName::try_from(host.to_owned()).map_err(|_| anyhow!("invalid server name: {}", host))?,
    };
    let tls = connector.connect(server_name, stream).await?;
    let leaf = tls.get_ref().1.peer_certificates().and_then(|certs| certs.first());
    Ok(match leaf {
        Some(der) => cert_expiry(der.as_ref()),
        None => CertExpiry::Missing,
    })
}

fn cert_expiry(der: &[u8]) -> CertExpiry {
    use x509_parser::prelude::*;
    match X509Certificate::from_der(der) {
        Ok((_, x509)) => CertExpiry::At(x509.validity().not_after.to_datetime()),
        Err(_) => CertExpiry::Missing,
    }
}
