//! Server configuration.
//!
//! Values start from [`ServerConfig::default`] and may be overridden from the
//! environment with [`ServerConfig::from_env`]. The configuration is immutable
//! once the server is built.

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::server::error::Error;

/// Prefix shared by every environment variable the server reads.
pub const ENV_PREFIX: &str = "MICROHTTPS_";

/// HTTPS server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The address to bind to.
    pub addr: SocketAddr,
    /// The directory served to clients.
    pub root_dir: PathBuf,
    /// PEM certificate chain, leaf first.
    pub cert_path: PathBuf,
    /// PEM private key matching the leaf certificate.
    pub key_path: PathBuf,
    /// The maximum number of concurrent connections.
    pub max_connections: usize,
    /// The read buffer size, which is also the largest accepted request head.
    pub read_buffer_size: usize,
    /// Upper bound on the TLS handshake.
    pub handshake_timeout: Duration,
    /// Upper bound on receiving the request head after the handshake.
    pub read_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let (cert_path, key_path) = cert_paths_for_host(Path::new("."), "localhost");
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            root_dir: PathBuf::from("."),
            cert_path,
            key_path,
            max_connections: 1024,
            read_buffer_size: 8192,
            handshake_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
        }
    }
}

/// Certificate and key paths following the `<host>.pem` / `<host>-key.pem`
/// naming convention inside `dir`.
pub fn cert_paths_for_host(dir: &Path, host: &str) -> (PathBuf, PathBuf) {
    (dir.join(format!("{host}.pem")), dir.join(format!("{host}-key.pem")))
}

impl ServerConfig {
    /// Build a configuration from the defaults and the process environment.
    ///
    /// See [`ServerConfig::from_lookup`] for the variables that are read.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from the defaults and a variable lookup.
    ///
    /// Recognised names (all prefixed with `MICROHTTPS_`): `ADDR`, `ROOT`,
    /// `HOST`, `CERT_DIR`, `CERT`, `KEY`, `MAX_CONNECTIONS`, `TIMEOUT_SECS`.
    /// `CERT` and `KEY` take precedence over the paths derived from
    /// `CERT_DIR` and `HOST`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.trim().is_empty())
        };
        let mut config = Self::default();

        if let Some(addr) = var("ADDR") {
            config.addr = parse_value("ADDR", &addr)?;
        }
        if let Some(root) = var("ROOT") {
            config.root_dir = PathBuf::from(root);
        }

        let host = var("HOST").unwrap_or_else(|| "localhost".to_string());
        let cert_dir = var("CERT_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
        let (cert_path, key_path) = cert_paths_for_host(&cert_dir, &host);
        config.cert_path = var("CERT").map(PathBuf::from).unwrap_or(cert_path);
        config.key_path = var("KEY").map(PathBuf::from).unwrap_or(key_path);

        if let Some(max) = var("MAX_CONNECTIONS") {
            config.max_connections = parse_value("MAX_CONNECTIONS", &max)?;
        }
        if let Some(secs) = var("TIMEOUT_SECS") {
            let secs: u64 = parse_value("TIMEOUT_SECS", &secs)?;
            config.handshake_timeout = Duration::from_secs(secs);
            config.read_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    ///
    /// The connection limit sizes a semaphore, which only holds
    /// [`Semaphore::MAX_PERMITS`] permits.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_connections == 0 || self.max_connections > Semaphore::MAX_PERMITS {
            return Err(Error::Config(format!(
                "{ENV_PREFIX}MAX_CONNECTIONS must be between 1 and {}, got {}",
                Semaphore::MAX_PERMITS,
                self.max_connections
            )));
        }
        if self.read_buffer_size == 0 {
            return Err(Error::Config("read buffer size must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn parse_value<T>(name: &str, value: &str) -> Result<T, Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid {ENV_PREFIX}{name} {value:?}: {e}")))
}
