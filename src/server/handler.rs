//! The request handler capability.
//!
//! A handler turns a [`ResolvedPath`] into a response. Path resolution and the
//! root containment check always run before a handler sees the request.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::server::error::Error;
use crate::server::resolve::ResolvedPath;
use crate::server::response::HttpResponse;
use crate::server::static_files;

/// Type alias for a boxed future that returns a Result<HttpResponse, Error>.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>;

/// Type alias for a handler function that takes a ResolvedPath and returns a HandlerFuture.
pub type HandlerFn = Arc<dyn Fn(ResolvedPath) -> HandlerFuture + Send + Sync>;

/// Box an async function into a [`HandlerFn`].
pub fn handler_fn<F, Fut>(handler: F) -> HandlerFn
where
    F: Fn(ResolvedPath) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    Arc::new(move |resolved: ResolvedPath| -> HandlerFuture { Box::pin(handler(resolved)) })
}

/// The default handler serving files, index documents and listings.
pub fn static_file_handler() -> HandlerFn {
    handler_fn(static_files::serve)
}
