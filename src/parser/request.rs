//! HTTP request parsing and representation.

use std::collections::HashMap;
use std::str::FromStr;

use crate::parser::encoding::percent_decode;
use crate::parser::error::Error;
use crate::parser::method::Method;
use crate::parser::version::HttpVersion;

/// Represents an HTTP request head.
///
/// The server never reads request bodies, so none is kept.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP method (GET, HEAD, etc.)
    pub method: Method,
    /// The request target exactly as sent, including any query string
    pub path: String,
    /// The HTTP version
    pub version: HttpVersion,
    /// The HTTP headers
    pub headers: HashMap<String, String>,
}

impl HttpRequest {
    /// Create a new HTTP request.
    ///
    /// # Arguments
    ///
    /// * `method` - The HTTP method
    /// * `path` - The request target
    /// * `version` - The HTTP version
    /// * `headers` - The HTTP headers
    pub fn new(method: Method, path: String, version: HttpVersion, headers: HashMap<String, String>) -> Self {
        Self {
            method,
            path,
            version,
            headers,
        }
    }

    /// Get a header value.
    ///
    /// Header names are matched case-insensitively.
    pub fn get_header(&self, name: &str) -> Option<&String> {
        self.headers.iter().find_map(|(k, v)| {
            if k.eq_ignore_ascii_case(name) {
                Some(v)
            } else {
                None
            }
        })
    }

    /// The path component of the target, with query string and fragment removed.
    pub fn path_without_query(&self) -> &str {
        let end = self.path.find(|c: char| c == '?' || c == '#').unwrap_or(self.path.len());
        &self.path[..end]
    }

    /// The query string including its leading `?`, or `""` when absent.
    pub fn query_string(&self) -> &str {
        match self.path.find('?') {
            Some(start) => {
                let rest = &self.path[start..];
                let end = rest.find('#').unwrap_or(rest.len());
                &rest[..end]
            }
            None => "",
        }
    }

    /// The percent-decoded path component.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEncoding`] for broken escapes and
    /// [`Error::InvalidPath`] when the decoded bytes are not UTF-8.
    pub fn decoded_path(&self) -> Result<String, Error> {
        percent_decode(self.path_without_query())
    }
}

/// Parse an HTTP request head from a byte slice.
///
/// # Arguments
///
/// * `input` - The request line and headers, optionally followed by the blank line
///
/// # Returns
///
/// The parsed HTTP request, or an error if the request is invalid
pub fn parse_request(input: &[u8]) -> Result<HttpRequest, Error> {
    // Convert the input to a string
    let input_str = match std::str::from_utf8(input) {
        Ok(s) => s,
        Err(_) => return Err(Error::MalformedRequestLine("Invalid UTF-8".to_string())),
    };

    // Split the input into lines
    let mut lines = input_str.lines();

    // Parse the request line
    let request_line = match lines.next() {
        Some(line) if !line.trim().is_empty() => line,
        _ => return Err(Error::EmptyRequest),
    };

    // Split the request line into method, path, and version
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(Error::MalformedRequestLine(request_line.to_string()));
    }

    // Parse the method
    let method = Method::from_str(parts[0])?;

    // Only origin-form targets name a file
    let path = parts[1].to_string();
    if !path.starts_with('/') {
        return Err(Error::InvalidPath);
    }

    // Parse the version
    let version = HttpVersion::from_str(parts[2])?;

    // Parse the headers
    let mut headers = HashMap::new();
    for line in lines {
        // Empty line indicates the end of headers
        if line.is_empty() {
            break;
        }

        let (name, value) = line.split_once(':').ok_or(Error::InvalidHeaderFormat)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidHeaderFormat);
        }

        headers.insert(name.to_string(), value.trim().to_string());
    }

    let request = HttpRequest::new(method, path, version, headers);

    // Check for required headers
    if request.version == HttpVersion::Http11 && request.get_header("Host").is_none() {
        return Err(Error::MissingHeader("Host".to_string()));
    }

    Ok(request)
}
