//! HTTP parser module.
//!
//! This module parses HTTP/1.x request heads and decodes request paths.
//! It performs no I/O; the server feeds it the bytes of a complete head.

mod request;
mod method;
mod version;
mod error;
mod encoding;

// Re-export public items
pub use request::HttpRequest;
pub use method::Method;
pub use version::HttpVersion;
pub use error::Error;
pub use encoding::{percent_decode, percent_encode_path};

// Re-export the parse_request function
pub use request::parse_request;
