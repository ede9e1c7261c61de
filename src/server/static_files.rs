//! The default handler: files, index documents and directory listings.

use std::path::Path;

use tokio::fs::File;

use crate::parser::percent_encode_path;
use crate::server::error::Error;
use crate::server::resolve::{lookup_error, ResolvedPath};
use crate::server::response::{HttpResponse, StatusCode};

/// Documents served in place of a listing, in order of preference.
pub const INDEX_FILES: [&str; 2] = ["index.html", "index.htm"];

/// Produce the response for a resolved path.
pub async fn serve(resolved: ResolvedPath) -> Result<HttpResponse, Error> {
    if !resolved.is_dir() {
        return serve_file(&resolved.fs_path, &resolved.url_path).await;
    }

    // Relative links in a listing or index page only work below a trailing slash.
    if !resolved.url_path.ends_with('/') {
        let location = format!("{}/{}", encode_url_path(&resolved.url_path), resolved.query);
        return Ok(HttpResponse::new(StatusCode::MovedPermanently).with_header("Location", location));
    }

    for index in INDEX_FILES {
        let candidate = resolved.fs_path.join(index);
        if let Ok(metadata) = tokio::fs::metadata(&candidate).await {
            if metadata.is_file() {
                return serve_file(&candidate, &resolved.url_path).await;
            }
        }
    }

    list_directory(&resolved).await
}

async fn serve_file(path: &Path, url_path: &str) -> Result<HttpResponse, Error> {
    let file = File::open(path).await.map_err(|e| lookup_error(e, url_path))?;
    let len = file.metadata().await?.len();

    Ok(HttpResponse::new(StatusCode::Ok)
        .with_content_type(content_type(path))
        .with_file(file, len))
}

async fn list_directory(resolved: &ResolvedPath) -> Result<HttpResponse, Error> {
    let mut reader = tokio::fs::read_dir(&resolved.fs_path)
        .await
        .map_err(|e| lookup_error(e, &resolved.url_path))?;

    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        // Follow symlinks so a linked directory is listed as one.
        let is_dir = tokio::fs::metadata(entry.path())
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        entries.push((name, is_dir));
    }
    entries.sort_by_key(|(name, _)| name.to_lowercase());

    let title = format!("Directory listing for {}", html_escape(&resolved.url_path));
    let mut html = format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n<hr>\n<ul>\n"
    );
    for (name, is_dir) in &entries {
        let slash = if *is_dir { "/" } else { "" };
        html.push_str(&format!(
            "<li><a href=\"{href}{slash}\">{label}{slash}</a></li>\n",
            href = percent_encode_path(name),
            label = html_escape(name),
        ));
    }
    html.push_str("</ul>\n<hr>\n</body>\n</html>\n");

    Ok(HttpResponse::new(StatusCode::Ok)
        .with_content_type("text/html; charset=utf-8")
        .with_body_string(html))
}

/// Percent-encode each segment of a decoded URL path, keeping the slashes.
fn encode_url_path(path: &str) -> String {
    path.split('/').map(percent_encode_path).collect::<Vec<_>>().join("/")
}

fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Pick a `Content-Type` from the file extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" | "map" => "application/json",
        "txt" | "patt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/vnd.microsoft.icon",
        "avif" => "image/avif",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "glb" => "model/gltf-binary",
        "gltf" => "model/gltf+json",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        _ => "application/octet-stream",
    }
}
