//! `microhttps`: serve a directory over HTTPS.
//!
//! Takes no arguments. Configuration comes from `MICROHTTPS_*` environment
//! variables (see [`ServerConfig::from_lookup`]) and logging from `RUST_LOG`.

use env_logger::Env;
use log::error;
use microhttps_rs::{HttpsServer, ServerConfig, ServerError};

async fn start() -> Result<(), ServerError> {
    let config = ServerConfig::from_env()?;
    let server = HttpsServer::bind(config).await?;
    server.run().await
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = start().await {
        error!("{e}");
        std::process::exit(1);
    }
}
