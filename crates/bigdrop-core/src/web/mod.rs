//! Embedded HTTP store server.
//!
//! Exposes the three-message transfer protocol plus download of finished
//! artifacts:
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | POST | /verify | Dedup check and resumption inventory |
//! | POST | /upload | Multipart chunk placement |
//! | POST | /merge | Assemble chunks into the artifact |
//! | GET | /uploads/{name} | Download one merged artifact |
//!
//! CORS is permissive so a browser client on another origin can upload
//! directly. The request body limit sits above the chunk size so a full
//! chunk plus multipart framing always fits.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

use crate::error::Result;
use crate::store::ChunkStore;
use crate::DEFAULT_SERVER_PORT;

pub mod error;
pub mod handlers;

/// Default request body cap, comfortably above the default chunk size.
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024 * 1024;

/// Configuration for the store server.
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Bind to localhost only.
    pub localhost_only: bool,
    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERVER_PORT,
            localhost_only: false,
            max_body_bytes: DEFAULT_BODY_LIMIT,
        }
    }
}

impl WebServerConfig {
    /// The socket address to bind.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        if self.localhost_only {
            SocketAddr::from(([127, 0, 0, 1], self.port))
        } else {
            SocketAddr::from(([0, 0, 0, 0], self.port))
        }
    }
}

/// Build the store router over `store`.
///
/// Downloads go through a handler that resolves only finished artifact
/// names, so the chunk inventory and merge scratch files under the store
/// root are never reachable over GET.
pub fn build_router(store: Arc<ChunkStore>, config: &WebServerConfig) -> Router {
    Router::new()
        .route("/verify", post(handlers::verify))
        .route("/upload", post(handlers::upload_chunk))
        .route("/merge", post(handlers::merge))
        .route("/uploads/{name}", get(handlers::download))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(CorsLayer::permissive())
        .with_state(store)
}

/// Bind and serve the store until the process exits.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn run_server(config: WebServerConfig, store: Arc<ChunkStore>) -> Result<()> {
    let addr = config.bind_addr();
    let app = build_router(store, &config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "store server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
