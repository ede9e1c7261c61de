//! HTTPS server implementation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

use crate::parser::{parse_request, Error as ParserError, Method};
use crate::server::config::ServerConfig;
use crate::server::error::Error;
use crate::server::handler::{static_file_handler, HandlerFn};
use crate::server::resolve::{canonical_root, resolve};
use crate::server::response::{HttpResponse, StatusCode};
use crate::server::tls;

/// Everything a connection task needs after the handshake.
#[derive(Clone)]
pub struct ConnectionContext {
    /// Canonical root directory.
    pub root: PathBuf,
    /// Produces responses for resolved paths.
    pub handler: HandlerFn,
    /// Largest accepted request head.
    pub read_buffer_size: usize,
    /// Upper bound on receiving the request head.
    pub read_timeout: Duration,
}

impl ConnectionContext {
    /// Context serving `root` with the static file handler.
    pub fn new(root: PathBuf, config: &ServerConfig) -> Self {
        Self {
            root,
            handler: static_file_handler(),
            read_buffer_size: config.read_buffer_size,
            read_timeout: config.read_timeout,
        }
    }
}

/// A static file server speaking HTTP/1.x over TLS.
///
/// Built by [`HttpsServer::bind`], which loads the TLS materials before the
/// socket is bound, and driven by [`HttpsServer::run`].
pub struct HttpsServer {
    /// The server configuration.
    pub config: Arc<ServerConfig>,
    acceptor: TlsAcceptor,
    listener: TcpListener,
    context: ConnectionContext,
}

impl HttpsServer {
    /// Check the configuration, load the certificate and key, check the root
    /// directory, then bind.
    ///
    /// Any failure here is fatal, and nothing is listening when it happens.
    pub async fn bind(config: ServerConfig) -> Result<Self, Error> {
        config.validate()?;
        let acceptor = tls::build_acceptor(&config.cert_path, &config.key_path)?;
        let root = canonical_root(&config.root_dir)?;
        let listener = Self::setup_listener(config.addr).await?;

        let context = ConnectionContext::new(root, &config);
        Ok(Self {
            config: Arc::new(config),
            acceptor,
            listener,
            context,
        })
    }

    /// Replace the static file handler.
    pub fn with_handler(mut self, handler: HandlerFn) -> Self {
        self.context.handler = handler;
        self
    }

    /// The address actually bound, useful when the configured port is 0.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Set up the TCP listener.
    async fn setup_listener(addr: SocketAddr) -> Result<TcpListener, Error> {
        TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })
    }

    /// Set up a Ctrl+C handler for graceful shutdown.
    fn setup_ctrl_c_handler(shutdown_tx: mpsc::Sender<()>, tasks: &mut JoinSet<()>) {
        tasks.spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                    let _ = shutdown_tx.send(()).await;
                }
                Err(e) => {
                    error!("Error setting up Ctrl+C handler: {e}");
                }
            }
        });
    }

    /// Spawn a task for a freshly accepted TCP connection.
    fn handle_new_connection(
        &self,
        socket: TcpStream,
        addr: SocketAddr,
        semaphore: &Arc<Semaphore>,
        context: &Arc<ConnectionContext>,
        tasks: &mut JoinSet<()>,
    ) {
        // Nothing may be written before the handshake, so a connection over
        // the limit is dropped rather than answered.
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Connection limit reached, dropping connection from {addr}");
                return;
            }
        };

        let acceptor = self.acceptor.clone();
        let context = context.clone();
        let handshake_timeout = self.config.handshake_timeout;

        tasks.spawn(async move {
            // The permit is dropped when the task completes, releasing the semaphore slot
            let _permit = permit;

            if let Err(e) = Self::serve_connection(socket, addr, acceptor, handshake_timeout, &context).await {
                warn!("Connection from {addr} failed: {e}");
            }
        });
    }

    /// Handle connection errors.
    async fn handle_accept_error(e: std::io::Error) {
        error!("Error accepting connection: {e}");

        // Usually descriptor exhaustion; give in-flight connections a moment.
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    /// Perform graceful shutdown.
    async fn perform_shutdown(tasks: &mut JoinSet<()>) {
        info!("Waiting for {len} active connections to complete...", len = tasks.len());
        let shutdown_timeout = Duration::from_secs(30);
        let _ = tokio::time::timeout(shutdown_timeout, async {
            while let Some(res) = tasks.join_next().await {
                if let Err(e) = res {
                    error!("Task failed during shutdown: {e}");
                }
            }
        })
        .await;

        info!("Server shutdown complete");
    }

    /// Accept connections until the process is interrupted.
    pub async fn run(self) -> Result<(), Error> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let mut tasks = JoinSet::new();
        Self::setup_ctrl_c_handler(shutdown_tx, &mut tasks);

        self.serve_until(shutdown_rx, tasks).await
    }

    /// The accept loop. Stops only when a shutdown message arrives; a closed
    /// channel leaves the server running.
    async fn serve_until(self, mut shutdown_rx: mpsc::Receiver<()>, mut tasks: JoinSet<()>) -> Result<(), Error> {
        info!("Serving on https://{addr}", addr = self.local_addr()?);
        debug!("Root directory: {root}", root = self.context.root.display());

        let semaphore = Arc::new(Semaphore::new(self.config.max_connections));
        let context = Arc::new(self.context.clone());

        loop {
            tokio::select! {
                Some(()) = shutdown_rx.recv() => {
                    info!("Shutting down server...");
                    break;
                }

                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((socket, addr)) => {
                            self.handle_new_connection(socket, addr, &semaphore, &context, &mut tasks);
                        }
                        Err(e) => Self::handle_accept_error(e).await,
                    }
                }
            }

            // Reap finished connection tasks so the set does not grow.
            while let Some(res) = tasks.try_join_next() {
                if let Err(e) = res {
                    error!("Connection task panicked: {e}");
                }
            }
        }

        Self::perform_shutdown(&mut tasks).await;

        Ok(())
    }

    /// Run the TLS handshake, then serve one request.
    async fn serve_connection(
        socket: TcpStream,
        addr: SocketAddr,
        acceptor: TlsAcceptor,
        handshake_timeout: Duration,
        context: &ConnectionContext,
    ) -> Result<(), Error> {
        let mut stream = match tokio::time::timeout(handshake_timeout, acceptor.accept(socket)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!("TLS handshake with {addr} failed: {e}");
                return Ok(());
            }
            Err(_) => return Err(Error::HandshakeTimeout(handshake_timeout)),
        };

        Self::handle_connection(&mut stream, addr, context).await?;
        Ok(())
    }

    /// Read the request head: everything up to and including the blank line.
    ///
    /// Returns `None` when the peer closed the connection without sending
    /// anything.
    async fn read_request_head(
        socket: &mut (impl AsyncRead + Unpin),
        max_size: usize,
    ) -> Result<Option<Vec<u8>>, Error> {
        let mut head = Vec::with_capacity(1024);
        let mut buf = vec![0; max_size.min(8192)];

        loop {
            // Never buffer past the limit, even when the terminator is near.
            let room = (max_size - head.len()).min(buf.len());
            let n = socket.read(&mut buf[..room]).await?;
            if n == 0 {
                return Ok((!head.is_empty()).then_some(head));
            }
            head.extend_from_slice(&buf[..n]);

            if let Some(end) = find_head_end(&head) {
                head.truncate(end);
                return Ok(Some(head));
            }
            if head.len() >= max_size {
                return Err(Error::RequestTooLarge(max_size));
            }
        }
    }

    /// Handle a single connection: read one request, write one response,
    /// then close.
    ///
    /// Returns the status sent, or `None` if the peer sent nothing. HTTP-level
    /// failures (bad request, not found, ...) are answered and reported as
    /// `Ok`; only transport failures are errors.
    pub async fn handle_connection(
        socket: &mut (impl AsyncRead + AsyncWrite + Unpin),
        addr: SocketAddr,
        context: &ConnectionContext,
    ) -> Result<Option<StatusCode>, Error> {
        let head = tokio::time::timeout(
            context.read_timeout,
            Self::read_request_head(socket, context.read_buffer_size),
        )
        .await
        .unwrap_or(Err(Error::ReadTimeout(context.read_timeout)));

        let head = match head {
            Ok(Some(head)) => head,
            Ok(None) => return Ok(None),
            Err(e @ (Error::RequestTooLarge(_) | Error::ReadTimeout(_))) => {
                let response = error_response(&e);
                return Self::finish(socket, addr, "-", response, true).await;
            }
            Err(e) => return Err(e),
        };

        let request = match parse_request(&head) {
            Ok(request) => request,
            Err(e) => {
                let response = error_response(&Error::ParseError(e));
                return Self::finish(socket, addr, "-", response, true).await;
            }
        };
        let request_line = format!("{} {} {}", request.method, request.path, request.version);

        let response = if request.method.is_servable() {
            match resolve(&context.root, &request).await {
                Ok(resolved) => (context.handler)(resolved).await,
                Err(e) => Err(e),
            }
        } else {
            Err(Error::NotImplemented(request.method))
        };
        let response = response.unwrap_or_else(|e| error_response(&e));

        let include_body = request.method != Method::HEAD;
        Self::finish(socket, addr, &request_line, response, include_body).await
    }

    /// Write the response, log it, and close the stream.
    async fn finish(
        socket: &mut (impl AsyncWrite + Unpin),
        addr: SocketAddr,
        request_line: &str,
        response: HttpResponse,
        include_body: bool,
    ) -> Result<Option<StatusCode>, Error> {
        let status = response.status;
        let written = response.write_to(socket, include_body).await?;
        info!("{addr} \"{request_line}\" {code} {written}", code = status.as_u16());

        if let Err(e) = socket.shutdown().await {
            debug!("Error closing connection from {addr}: {e}");
        }
        Ok(Some(status))
    }
}

/// Offset just past the blank line ending a request head, accepting bare LF.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4);
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| i + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Map an error to the response the client sees.
///
/// Internal details are logged, never sent.
pub fn error_response(e: &Error) -> HttpResponse {
    match e {
        Error::ParseError(ParserError::InvalidMethod(method)) => {
            HttpResponse::error(StatusCode::NotImplemented, format!("Unsupported method: {method}"))
        }
        Error::ParseError(ParserError::InvalidVersion(version)) => HttpResponse::error(
            StatusCode::HttpVersionNotSupported,
            format!("Unsupported HTTP version: {version}"),
        ),
        Error::ParseError(e) => HttpResponse::error(StatusCode::BadRequest, format!("Bad request: {e}")),
        Error::RequestTooLarge(_) => HttpResponse::error(StatusCode::BadRequest, e.to_string()),
        Error::ReadTimeout(_) => HttpResponse::error(StatusCode::RequestTimeout, "Request timed out"),
        Error::NotImplemented(method) => {
            HttpResponse::error(StatusCode::NotImplemented, format!("Unsupported method: {method}"))
        }
        Error::Forbidden(path) => HttpResponse::error(StatusCode::Forbidden, format!("Forbidden: {path}")),
        Error::NotFound(path) => HttpResponse::error(StatusCode::NotFound, format!("Not found: {path}")),
        other => {
            error!("Error serving request: {other}");
            HttpResponse::error(StatusCode::InternalServerError, "Internal server error")
        }
    }
}
