//! Loading of TLS materials.
//!
//! The certificate chain and private key are read once at startup and turned
//! into a [`TlsAcceptor`]. A key that does not belong to the leaf certificate
//! is rejected here, before any socket exists.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use log::debug;
use rustls::crypto::{aws_lc_rs, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use rustls::{InconsistentKeys, ServerConfig as RustlsServerConfig};
use tokio_rustls::TlsAcceptor;

use crate::server::error::Error;

/// ALPN identifiers offered to clients.
const ALPN_PROTOCOLS: [&[u8]; 2] = [b"http/1.1", b"http/1.0"];

/// Read every certificate from a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, Error> {
    let file = File::open(path).map_err(|source| Error::CertificateLoad {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| Error::CertificateLoad {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(Error::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

/// Read the first private key (PKCS#8, PKCS#1 or SEC1) from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, Error> {
    let file = File::open(path).map_err(|source| Error::CertificateLoad {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| Error::CertificateLoad {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| Error::NoPrivateKey(path.to_path_buf()))
}

/// Build the rustls server configuration from PEM files.
///
/// Fails when either file is missing or empty, or when the private key does
/// not match the public key of the first certificate.
pub fn build_server_config(cert_path: &Path, key_path: &Path) -> Result<RustlsServerConfig, Error> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;
    let provider = Arc::new(aws_lc_rs::default_provider());

    check_key_matches(&provider, &certs, &key)?;

    let mut config = RustlsServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

    debug!(
        "Loaded TLS certificate {cert} and key {key}",
        cert = cert_path.display(),
        key = key_path.display()
    );
    Ok(config)
}

/// Build the acceptor used to wrap every accepted connection.
pub fn build_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, Error> {
    let config = build_server_config(cert_path, key_path)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn check_key_matches(
    provider: &CryptoProvider,
    certs: &[CertificateDer<'static>],
    key: &PrivateKeyDer<'static>,
) -> Result<(), Error> {
    let signing_key = provider.key_provider.load_private_key(key.clone_key())?;
    let certified = CertifiedKey::new(certs.to_vec(), signing_key);
    match certified.keys_match() {
        // Some key types cannot report their public half; the handshake
        // would still fail later for a wrong key.
        Err(rustls::Error::InconsistentKeys(InconsistentKeys::Unknown)) => Ok(()),
        other => other.map_err(Error::from),
    }
}
