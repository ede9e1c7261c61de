//! HTTP response types and utilities.

use std::collections::HashMap;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::server::error::Error;

/// Value of the `Server` header on every response.
pub const SERVER_NAME: &str = "microhttps-rs";

/// HTTP status codes the file server produces, with their reason phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 200,
    MovedPermanently = 301,
    BadRequest = 400,
    Forbidden = 403,
    NotFound = 404,
    RequestTimeout = 408,
    InternalServerError = 500,
    NotImplemented = 501,
    HttpVersionNotSupported = 505,
}

impl StatusCode {
    /// Numeric status code.
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Get the reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::RequestTimeout => "Request Timeout",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::HttpVersionNotSupported => "HTTP Version Not Supported",
        }
    }
}

/// The payload of a response.
#[derive(Debug)]
pub enum Body {
    /// Bytes already in memory.
    Bytes(Vec<u8>),
    /// An open file streamed to the client; `len` bytes are sent.
    File { file: File, len: u64 },
}

impl Body {
    /// Number of bytes the body will produce.
    pub fn len(&self) -> u64 {
        match self {
            Body::Bytes(bytes) => bytes.len() as u64,
            Body::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Represents an HTTP response.
#[derive(Debug)]
pub struct HttpResponse {
    /// The HTTP status code
    pub status: StatusCode,
    /// The HTTP headers
    pub headers: HashMap<String, String>,
    /// The response body
    pub body: Body,
}

impl HttpResponse {
    /// Create a new HTTP response with the given status code and an empty body.
    ///
    /// One request is served per connection, so every response announces
    /// `Connection: close`.
    pub fn new(status: StatusCode) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Server".to_string(), SERVER_NAME.to_string());
        headers.insert("Connection".to_string(), "close".to_string());
        headers.insert("Content-Length".to_string(), "0".to_string());

        Self {
            status,
            headers,
            body: Body::Bytes(Vec::new()),
        }
    }

    /// A plain-text error response.
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status)
            .with_content_type("text/plain; charset=utf-8")
            .with_body_string(message)
    }

    /// Set the response body with a string.
    pub fn with_body_string(self, body: impl Into<String>) -> Self {
        self.with_body_bytes(body.into().into_bytes())
    }

    /// Set the response body with bytes.
    pub fn with_body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Body::Bytes(body.into());
        let content_length = self.body.len().to_string();
        self.with_header("Content-Length", content_length)
    }

    /// Stream `len` bytes of an open file as the body.
    pub fn with_file(mut self, file: File, len: u64) -> Self {
        self.body = Body::File { file, len };
        self.with_header("Content-Length", len.to_string())
    }

    /// Add or replace a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the content type.
    pub fn with_content_type(self, content_type: impl Into<String>) -> Self {
        self.with_header("Content-Type", content_type)
    }

    /// Get a header value, matching the name case-insensitively.
    pub fn get_header(&self, name: &str) -> Option<&String> {
        self.headers
            .iter()
            .find_map(|(k, v)| k.eq_ignore_ascii_case(name).then_some(v))
    }

    /// Serialise the status line and headers, including the blank line.
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        let status_line = format!("HTTP/1.1 {} {}\r\n", self.status.as_u16(), self.status.reason_phrase());
        bytes.extend_from_slice(status_line.as_bytes());

        for (name, value) in &self.headers {
            let header_line = format!("{name}: {value}\r\n");
            bytes.extend_from_slice(header_line.as_bytes());
        }

        bytes.extend_from_slice(b"\r\n");
        bytes
    }

    /// Write the response to `writer`, leaving out the body when
    /// `include_body` is false (HEAD requests).
    ///
    /// Returns the number of body bytes written. A file that ends before
    /// `Content-Length` bytes were sent is an error; the caller must close the
    /// connection since the framing is broken.
    pub async fn write_to<W>(self, writer: &mut W, include_body: bool) -> Result<u64, Error>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.head_bytes()).await?;

        if !include_body {
            writer.flush().await?;
            return Ok(0);
        }

        let written = match self.body {
            Body::Bytes(bytes) => {
                writer.write_all(&bytes).await?;
                bytes.len() as u64
            }
            Body::File { file, len } => {
                let copied = tokio::io::copy(&mut file.take(len), writer).await?;
                if copied != len {
                    return Err(Error::InternalError(format!(
                        "file shrank while sending: {copied} of {len} bytes"
                    )));
                }
                copied
            }
        };

        writer.flush().await?;
        Ok(written)
    }
}
