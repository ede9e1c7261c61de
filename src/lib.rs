//! A minimal static file server over HTTPS.
//!
//! The server loads a PEM certificate chain and private key, binds a TCP
//! listener, and answers `GET` and `HEAD` requests for files below a root
//! directory. Each accepted connection completes a TLS handshake, sends one
//! HTTP/1.x request, receives one response and is closed.
//!
//! # Features
//!
//! - TLS via rustls; a key that does not match the certificate is rejected
//!   before the socket is bound
//! - Path resolution confined to the root directory, including through
//!   symlinks and percent-encoded `..` segments
//! - `index.html` / `index.htm` documents and HTML directory listings
//! - Content types picked from file extensions
//! - Per-connection handshake and read timeouts and a connection limit
//!
//! # Examples
//!
//! ## Parsing a request head
//!
//! ```
//! use microhttps_rs::{parse_request, Method};
//!
//! let request = parse_request(b"GET /docs/a%20b.txt?v=2 HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
//! assert_eq!(request.method, Method::GET);
//! assert_eq!(request.path_without_query(), "/docs/a%20b.txt");
//! assert_eq!(request.decoded_path().unwrap(), "/docs/a b.txt");
//! ```
//!
//! ## Running the server
//!
//! ```no_run
//! use microhttps_rs::{HttpsServer, ServerConfig};
//!
//! # async fn run() -> Result<(), microhttps_rs::ServerError> {
//! let config = ServerConfig {
//!     addr: "127.0.0.1:8443".parse().unwrap(),
//!     root_dir: "public".into(),
//!     cert_path: "dev/localhost.pem".into(),
//!     key_path: "dev/localhost-key.pem".into(),
//!     ..ServerConfig::default()
//! };
//!
//! HttpsServer::bind(config).await?.run().await
//! # }
//! ```

// Export the parser module
pub mod parser;

// Export the server module
pub mod server;

// Re-export commonly used items for convenience
pub use parser::{Error as ParserError, HttpRequest, HttpVersion, Method, parse_request};
pub use server::{Error as ServerError, HttpResponse, HttpsServer, ServerConfig, StatusCode};
