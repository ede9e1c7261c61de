//! Tests for the connection handling of the HTTPS server.
//!
//! TLS is out of the picture here: `handle_connection` runs after the
//! handshake and is driven through in-memory streams.

#[cfg(test)]
mod server_tests {
    use std::fs;
    use std::io::{self, Cursor};
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

    use crate::server::{
        canonical_root, handler_fn, ConnectionContext, Error, HttpResponse, HttpsServer, ServerConfig, StatusCode,
    };

    // Mock stream standing in for a TLS session after the handshake
    struct MockTcpStream {
        read_data: Cursor<Vec<u8>>,
        write_data: Vec<u8>,
        shut_down: bool,
    }

    impl MockTcpStream {
        fn new(read_data: impl Into<Vec<u8>>) -> Self {
            Self {
                read_data: Cursor::new(read_data.into()),
                write_data: Vec::new(),
                shut_down: false,
            }
        }

        fn written_data(&self) -> &[u8] {
            &self.write_data
        }
    }

    impl AsyncRead for MockTcpStream {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let this = self.get_mut();
            let n = std::io::Read::read(&mut this.read_data, buf.initialize_unfilled())?;
            buf.advance(n);
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for MockTcpStream {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            this.write_data.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.get_mut().shut_down = true;
            Poll::Ready(Ok(()))
        }
    }

    struct Site {
        _dir: tempfile::TempDir,
        context: ConnectionContext,
        logo: Vec<u8>,
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    /// A root with a page, a binary file and a subdirectory, plus a file
    /// next to the root that must never be served.
    fn site() -> Site {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("www");
        fs::create_dir_all(root.join("assets")).unwrap();
        fs::write(root.join("index.html"), "<h1>home</h1>").unwrap();
        let logo: Vec<u8> = (0..=255u8).rev().cycle().take(20_000).collect();
        fs::write(root.join("assets/logo.png"), &logo).unwrap();
        fs::write(dir.path().join("secret.txt"), "top secret").unwrap();

        let root: PathBuf = canonical_root(&root).unwrap();
        let context = ConnectionContext::new(root, &ServerConfig::default());
        Site { _dir: dir, context, logo }
    }

    fn split_response(raw: &[u8]) -> (String, Vec<u8>) {
        let end = raw
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response has no header terminator");
        (String::from_utf8(raw[..end + 4].to_vec()).unwrap(), raw[end + 4..].to_vec())
    }

    async fn exchange(context: &ConnectionContext, request: &[u8]) -> (Option<StatusCode>, String, Vec<u8>) {
        let mut stream = MockTcpStream::new(request);
        let status = HttpsServer::handle_connection(&mut stream, peer(), context).await.unwrap();
        assert!(stream.shut_down, "connection was not closed");
        if stream.written_data().is_empty() {
            return (status, String::new(), Vec::new());
        }
        let (head, body) = split_response(stream.written_data());
        (status, head, body)
    }

    #[tokio::test]
    async fn test_serves_file_byte_for_byte() {
        let site = site();
        let (status, head, body) =
            exchange(&site.context, b"GET /assets/logo.png HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert_eq!(status, Some(StatusCode::Ok));
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Content-Type: image/png\r\n"));
        assert!(head.contains("Content-Length: 20000\r\n"));
        assert!(head.contains("Connection: close\r\n"));
        assert_eq!(body, site.logo);
    }

    #[tokio::test]
    async fn test_root_serves_index() {
        let site = site();
        let (status, head, body) = exchange(&site.context, b"GET / HTTP/1.0\r\n\r\n").await;
        assert_eq!(status, Some(StatusCode::Ok));
        assert!(head.contains("Content-Type: text/html\r\n"));
        assert_eq!(body, b"<h1>home</h1>");
    }

    #[tokio::test]
    async fn test_head_sends_no_body() {
        let site = site();
        let (status, head, body) =
            exchange(&site.context, b"HEAD /assets/logo.png HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert_eq!(status, Some(StatusCode::Ok));
        assert!(head.contains("Content-Length: 20000\r\n"));
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_traversal_is_forbidden() {
        let site = site();
        for target in ["/../secret.txt", "/assets/../../secret.txt", "/%2E%2E/secret.txt", "/assets%2f..%2f..%2fsecret.txt"] {
            let request = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
            let (status, head, body) = exchange(&site.context, request.as_bytes()).await;
            assert_eq!(status, Some(StatusCode::Forbidden), "{target}");
            assert!(head.starts_with("HTTP/1.1 403 Forbidden\r\n"));
            assert!(!String::from_utf8_lossy(&body).contains("top secret"));
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_is_forbidden() {
        let site = site();
        let outside = site.context.root.parent().unwrap().join("secret.txt");
        std::os::unix::fs::symlink(outside, site.context.root.join("escape.txt")).unwrap();

        let (status, _, body) = exchange(&site.context, b"GET /escape.txt HTTP/1.0\r\n\r\n").await;
        assert_eq!(status, Some(StatusCode::Forbidden));
        assert!(!String::from_utf8_lossy(&body).contains("top secret"));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let site = site();
        let (status, head, body) =
            exchange(&site.context, b"GET /nonexistent.html HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert_eq!(status, Some(StatusCode::NotFound));
        assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert_eq!(body, b"Not found: /nonexistent.html");
    }

    #[tokio::test]
    async fn test_directory_redirect_keeps_query() {
        let site = site();
        let (status, head, body) = exchange(&site.context, b"GET /assets?v=3 HTTP/1.0\r\n\r\n").await;
        assert_eq!(status, Some(StatusCode::MovedPermanently));
        assert!(head.contains("Location: /assets/?v=3\r\n"));
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_directory_listing() {
        let site = site();
        let (status, head, body) = exchange(&site.context, b"GET /assets/ HTTP/1.0\r\n\r\n").await;
        assert_eq!(status, Some(StatusCode::Ok));
        assert!(head.contains("Content-Type: text/html; charset=utf-8\r\n"));
        assert!(String::from_utf8(body).unwrap().contains("<a href=\"logo.png\">logo.png</a>"));
    }

    #[tokio::test]
    async fn test_unsupported_methods() {
        let site = site();
        let (status, head, _) =
            exchange(&site.context, b"POST /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert_eq!(status, Some(StatusCode::NotImplemented));
        assert!(head.starts_with("HTTP/1.1 501 Not Implemented\r\n"));

        let (status, _, _) = exchange(&site.context, b"BREW /pot HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert_eq!(status, Some(StatusCode::NotImplemented));
    }

    #[tokio::test]
    async fn test_unsupported_version() {
        let site = site();
        let (status, head, _) = exchange(&site.context, b"GET / HTTP/2.0\r\nHost: localhost\r\n\r\n").await;
        assert_eq!(status, Some(StatusCode::HttpVersionNotSupported));
        assert!(head.starts_with("HTTP/1.1 505 HTTP Version Not Supported\r\n"));
    }

    #[tokio::test]
    async fn test_malformed_requests() {
        let site = site();
        let requests: [&[u8]; 5] = [
            b"garbage",
            b"GET /index.html HTTP/1.1\r\n\r\n",
            b"GET /index.html HTTP/1.1\r\nHost localhost\r\n\r\n",
            b"GET /bad%zz HTTP/1.0\r\n\r\n",
            b"GET index.html HTTP/1.0\r\n\r\n",
        ];
        for request in requests {
            let (status, head, _) = exchange(&site.context, request).await;
            assert_eq!(status, Some(StatusCode::BadRequest), "{}", String::from_utf8_lossy(request));
            assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        }
    }

    #[tokio::test]
    async fn test_empty_connection_gets_no_response() {
        let site = site();
        let mut stream = MockTcpStream::new(Vec::<u8>::new());
        let status = HttpsServer::handle_connection(&mut stream, peer(), &site.context).await.unwrap();
        assert_eq!(status, None);
        assert!(stream.written_data().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_request_head() {
        let mut site = site();
        site.context.read_buffer_size = 64;
        let request = format!("GET /{} HTTP/1.1\r\nHost: localhost\r\n\r\n", "a".repeat(200));
        let (status, _, _) = exchange(&site.context, request.as_bytes()).await;
        assert_eq!(status, Some(StatusCode::BadRequest));
    }

    #[tokio::test]
    async fn test_head_limit_holds_across_reads() {
        let mut site = site();
        site.context.read_buffer_size = 100;

        // Exactly at the limit is fine.
        let mut request = b"GET /index.html HTTP/1.1\r\nHost: localhost\r\nX-Pad: ".to_vec();
        request.resize(96, b'a');
        request.extend_from_slice(b"\r\n\r\n");
        assert_eq!(request.len(), 100);
        let (status, _, _) = exchange(&site.context, &request).await;
        assert_eq!(status, Some(StatusCode::Ok));

        // The terminator arrives in the read that crosses the limit.
        let (mut client, mut server) = tokio::io::duplex(1024);
        let context = site.context.clone();
        let handle = tokio::spawn(async move {
            HttpsServer::handle_connection(&mut server, peer(), &context).await
        });

        let mut first = b"GET /index.html HTTP/1.1\r\nHost: localhost\r\nX-Pad: ".to_vec();
        first.resize(90, b'a');
        let mut second = vec![b'a'; 80];
        second.extend_from_slice(b"\r\n\r\n");
        tokio::io::AsyncWriteExt::write_all(&mut client, &first).await.unwrap();
        tokio::task::yield_now().await;
        tokio::io::AsyncWriteExt::write_all(&mut client, &second).await.unwrap();

        let status = handle.await.unwrap().unwrap();
        assert_eq!(status, Some(StatusCode::BadRequest));

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(response.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
        assert!(!String::from_utf8_lossy(&response).contains("<h1>home</h1>"));
    }

    #[tokio::test]
    async fn test_conditional_headers_are_ignored() {
        let site = site();
        let (status, head, body) = exchange(
            &site.context,
            b"GET /index.html HTTP/1.1\r\nHost: localhost\r\nIf-Modified-Since: Fri, 01 Jan 2100 00:00:00 GMT\r\n\r\n",
        )
        .await;
        assert_eq!(status, Some(StatusCode::Ok));
        assert!(!head.contains("Last-Modified"));
        assert_eq!(body, b"<h1>home</h1>");
    }

    #[tokio::test]
    async fn test_slow_client_times_out() {
        let mut site = site();
        site.context.read_timeout = Duration::from_millis(50);

        let (mut client, mut server) = tokio::io::duplex(1024);
        let context = site.context.clone();
        let handle = tokio::spawn(async move {
            HttpsServer::handle_connection(&mut server, peer(), &context).await
        });

        // Send half a request line and stall.
        tokio::io::AsyncWriteExt::write_all(&mut client, b"GET /index").await.unwrap();
        let status = handle.await.unwrap().unwrap();
        assert_eq!(status, Some(StatusCode::RequestTimeout));

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(response.starts_with(b"HTTP/1.1 408 Request Timeout\r\n"));
    }

    #[tokio::test]
    async fn test_custom_handler_runs_after_resolution() {
        let mut site = site();
        site.context.handler = handler_fn(|resolved| async move {
            Ok(HttpResponse::new(StatusCode::Ok)
                .with_content_type("text/plain")
                .with_body_string(format!("custom {}", resolved.url_path)))
        });

        let (status, _, body) = exchange(&site.context, b"GET /assets/logo.png HTTP/1.0\r\n\r\n").await;
        assert_eq!(status, Some(StatusCode::Ok));
        assert_eq!(body, b"custom /assets/logo.png");

        // The handler never sees paths outside the root.
        let (status, _, _) = exchange(&site.context, b"GET /../secret.txt HTTP/1.0\r\n\r\n").await;
        assert_eq!(status, Some(StatusCode::Forbidden));
    }

    #[tokio::test]
    async fn test_handler_error_is_internal_error() {
        let mut site = site();
        site.context.handler = handler_fn(|_resolved| async move {
            Err::<HttpResponse, _>(Error::IoError(io::Error::other("read failed")))
        });

        let (status, head, body) = exchange(&site.context, b"GET /index.html HTTP/1.0\r\n\r\n").await;
        assert_eq!(status, Some(StatusCode::InternalServerError));
        assert!(head.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert_eq!(body, b"Internal server error");
    }
}
