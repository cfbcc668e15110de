//! Shared TLS material for the HTTP/2 and HTTP/3 listeners (spec.md §4.8,
//! §6: TLS 1.3 minimum, certificate sourced from self-signed or ACME).

use std::path::Path;
use std::sync::Arc;

use bmc_certs::acme::ChallengeResponder;
use bmc_certs::{selfsigned, CertBundle, CertError};
use rustls::server::ServerConfig;
use thiserror::Error;

use crate::config::TlsSource;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error(transparent)]
    Cert(#[from] CertError),
    #[error("no certificate chain found in cert_pem")]
    EmptyChain,
    #[error("no private key found in key_pem")]
    MissingKey,
    #[error("rustls configuration error: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Load or provision the certificate this gateway will present, per
/// `TlsSource`. ACME provisioning serves its HTTP-01 challenges through
/// `responder`, which the `:80` listener also holds (spec.md §4.8).
pub async fn load_certificate(
    tls: &TlsSource,
    cert_path: &Path,
    key_path: &Path,
    responder: &ChallengeResponder,
) -> Result<CertBundle, TlsError> {
    match tls {
        TlsSource::SelfSigned { hostname } => {
            Ok(selfsigned::load_or_generate(hostname, cert_path, key_path).await?)
        }
        TlsSource::Acme { directory_url, domain } => {
            let cache_dir = cert_path.parent().unwrap_or_else(|| Path::new("."));
            Ok(bmc_certs::acme::provision(directory_url, domain, cache_dir, responder).await?)
        }
    }
}

/// Build the `rustls::ServerConfig` the TCP listener (HTTP/1.1 negotiated
/// via ALPN fallback, HTTP/2 preferred) presents. TLS 1.3 only, matching
/// spec.md §6's minimum version floor.
pub fn tcp_server_config(bundle: &CertBundle) -> Result<ServerConfig, TlsError> {
    let mut config = base_server_config(bundle)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

/// Build the `rustls::ServerConfig` the QUIC/HTTP-3 listener presents.
/// Same certificate, ALPN restricted to `h3`.
pub fn quic_server_config(bundle: &CertBundle) -> Result<ServerConfig, TlsError> {
    let mut config = base_server_config(bundle)?;
    config.alpn_protocols = vec![b"h3".to_vec()];
    Ok(config)
}

fn base_server_config(bundle: &CertBundle) -> Result<ServerConfig, TlsError> {
    let chain = rustls_pemfile::certs(&mut bundle.cert_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| TlsError::EmptyChain)?;
    if chain.is_empty() {
        return Err(TlsError::EmptyChain);
    }

    let key = rustls_pemfile::private_key(&mut bundle.key_pem().to_vec().as_slice())
        .map_err(|_| TlsError::MissingKey)?
        .ok_or(TlsError::MissingKey)?;

    let config = ServerConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
        .with_no_client_auth()
        .with_single_cert(chain, key)?;
    Ok(config)
}

/// Wrap a `ServerConfig` for use as a `quinn::crypto::rustls` server config.
pub fn quinn_server_config(config: ServerConfig) -> Result<quinn::ServerConfig, TlsError> {
    let quic_crypto = quinn::crypto::rustls::QuicServerConfig::try_from(config)
        .map_err(|e| TlsError::Rustls(rustls::Error::General(e.to_string())))?;
    Ok(quinn::ServerConfig::with_crypto(Arc::new(quic_crypto)))
}
