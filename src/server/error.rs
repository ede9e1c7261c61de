//! Error types for the HTTPS server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::parser::{Error as ParserError, Method};

/// Errors that can occur while starting or running the server.
///
/// Startup variants (`Config`, `Bind`, `CertificateLoad`, `NoCertificates`,
/// `NoPrivateKey` and `Tls`) are fatal. Everything else is confined to one
/// connection.
#[derive(Debug, Error)]
pub enum Error {
    /// Error parsing an HTTP request.
    #[error("Parse error: {0}")]
    ParseError(#[from] ParserError),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// TLS configuration or handshake error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// A certificate or key file could not be read.
    #[error("Failed to read {path}: {source}")]
    CertificateLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The listening socket could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The certificate file holds no PEM certificates.
    #[error("No certificates found in {0}")]
    NoCertificates(PathBuf),

    /// The key file holds no PEM private key.
    #[error("No private key found in {0}")]
    NoPrivateKey(PathBuf),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request path escapes the root directory.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Requested resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The method is recognised but a file server cannot answer it.
    #[error("Method {0} not implemented")]
    NotImplemented(Method),

    /// The request head exceeded the read buffer.
    #[error("Request head larger than {0} bytes")]
    RequestTooLarge(usize),

    /// The TLS handshake did not finish in time.
    #[error("TLS handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The request head did not arrive in time.
    #[error("Request read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// Internal server error.
    #[error("Internal server error: {0}")]
    InternalError(String),
}
