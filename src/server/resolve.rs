//! Mapping request paths onto the root directory.
//!
//! Every path handed to a handler went through [`resolve`], which guarantees
//! the canonical target lies inside the canonical root.

use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::parser::HttpRequest;
use crate::server::error::Error;

/// A request path proven to name an existing entry inside the root.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    /// The percent-decoded URL path, e.g. `/docs/readme.txt`.
    pub url_path: String,
    /// The raw query string including `?`, or empty.
    pub query: String,
    /// Canonical filesystem path.
    pub fs_path: PathBuf,
    /// Metadata of `fs_path`, following symlinks.
    pub metadata: Metadata,
}

impl ResolvedPath {
    pub fn is_dir(&self) -> bool {
        self.metadata.is_dir()
    }
}

/// Canonicalise the root directory once at startup.
pub fn canonical_root(root: &Path) -> Result<PathBuf, Error> {
    let canonical = std::fs::canonicalize(root)
        .map_err(|e| Error::Config(format!("root directory {}: {e}", root.display())))?;
    if !canonical.is_dir() {
        return Err(Error::Config(format!("root {} is not a directory", root.display())));
    }
    Ok(canonical)
}

/// Resolve the request target against `root`, which must already be canonical.
///
/// # Errors
///
/// * [`Error::ParseError`] if the path is not valid percent-encoded UTF-8.
/// * [`Error::Forbidden`] for `..` segments, NUL bytes, or a target whose
///   canonical form (after following symlinks) leaves the root.
/// * [`Error::NotFound`] if nothing exists at the path, or a trailing `/`
///   names a regular file.
pub async fn resolve(root: &Path, request: &HttpRequest) -> Result<ResolvedPath, Error> {
    let url_path = request.decoded_path()?;

    if url_path.contains('\0') {
        return Err(Error::Forbidden(request.path_without_query().to_string()));
    }

    let mut joined = root.to_path_buf();
    for segment in url_path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(Error::Forbidden(url_path)),
            _ if cfg!(windows) && segment.contains(|c: char| c == '\\' || c == ':') => {
                return Err(Error::Forbidden(url_path))
            }
            _ => joined.push(segment),
        }
    }

    let fs_path = match tokio::fs::canonicalize(&joined).await {
        Ok(path) => path,
        Err(e) => return Err(lookup_error(e, &url_path)),
    };
    if !fs_path.starts_with(root) {
        return Err(Error::Forbidden(url_path));
    }

    let metadata = tokio::fs::metadata(&fs_path)
        .await
        .map_err(|e| lookup_error(e, &url_path))?;
    if url_path.ends_with('/') && !metadata.is_dir() {
        return Err(Error::NotFound(url_path));
    }

    Ok(ResolvedPath {
        url_path,
        query: request.query_string().to_string(),
        fs_path,
        metadata,
    })
}

/// Classify a filesystem error met while looking up `url_path`.
pub(crate) fn lookup_error(e: std::io::Error, url_path: &str) -> Error {
    match e.kind() {
        ErrorKind::NotFound | ErrorKind::NotADirectory => Error::NotFound(url_path.to_string()),
        ErrorKind::PermissionDenied => Error::Forbidden(url_path.to_string()),
        _ => Error::IoError(e),
    }
}
