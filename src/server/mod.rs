//! HTTPS server implementation for microhttps-rs.
//!
//! This module wires TLS, request parsing and the static file handler into
//! a tokio accept loop with one task per connection.

mod response;
mod config;
mod error;
mod handler;
mod http_server;
mod resolve;
mod static_files;
mod tls;
mod tests;

// Re-export public items
pub use response::{Body, HttpResponse, StatusCode, SERVER_NAME};
pub use config::{cert_paths_for_host, ServerConfig, ENV_PREFIX};
pub use error::Error;
pub use handler::{handler_fn, static_file_handler, HandlerFn, HandlerFuture};
pub use http_server::{error_response, ConnectionContext, HttpsServer};
pub use resolve::{canonical_root, resolve, ResolvedPath};
pub use static_files::{content_type, serve as serve_static, INDEX_FILES};
pub use tls::{build_acceptor, build_server_config, load_certs, load_private_key};
