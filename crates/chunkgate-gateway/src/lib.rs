//! Content-addressed chunk gateway.
//!
//! Provides a [`GatewayServer`] that exposes an axum-based HTTP API in front
//! of a [`ChunkBackend`]:
//!
//! - `POST /{prefix}/`: ingest a chunk; responds with its encoded key.
//! - `GET /{prefix}/{key}`: fetch a chunk by encoded key.
//!
//! The gateway hashes every ingested body itself; a chunk's key is always
//! `sha256(body)`. Chunks already present in the backend are not written
//! again. Any other method or path is answered with 404.

mod error;
mod handlers;


use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use chunkgate_store::ChunkBackend;
use chunkgate_types::ChunkLimits;

pub use error::{GatewayError, InvalidPrefix};

/// Route prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "objects";

/// Shared application state for all gateway handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    /// Where chunks are stored.
    pub backend: Arc<dyn ChunkBackend>,
    /// Accepted chunk sizes.
    pub limits: ChunkLimits,
}

/// Configuration for creating a [`GatewayServer`].
pub struct GatewayServerConfig {
    /// The backend to serve.
    pub backend: Arc<dyn ChunkBackend>,
    /// Accepted chunk sizes.
    pub limits: ChunkLimits,
    /// Single path segment the resource is mounted under.
    pub prefix: String,
}

impl GatewayServerConfig {
    /// Default limits and prefix over the given backend.
    pub fn new(backend: Arc<dyn ChunkBackend>) -> Self {
        Self {
            backend,
            limits: ChunkLimits::default(),
            prefix: DEFAULT_PREFIX.to_owned(),
        }
    }
}

/// Whether `prefix` can be mounted as the resource path segment.
pub fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

/// HTTP gateway backed by a [`ChunkBackend`].
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    /// Create a new gateway with the given configuration.
    pub fn new(config: GatewayServerConfig) -> Result<Self, InvalidPrefix> {
        if !is_valid_prefix(&config.prefix) {
            return Err(InvalidPrefix(config.prefix));
        }

        let state = AppState {
            backend: config.backend,
            limits: config.limits,
        };

        let router = Self::build_router(&config.prefix, state);
        Ok(Self { router })
    }

    /// Build the axum [`Router`] for the chunk API.
    fn build_router(prefix: &str, state: AppState) -> Router {
        let ingest = post(handlers::ingest_handler).fallback(handlers::not_found);

        Router::new()
            .route(&format!("/{prefix}/"), ingest.clone())
            .route(&format!("/{prefix}"), ingest)
            .route(
                &format!("/{prefix}/{{key}}"),
                get(handlers::fetch_handler)
                    // Otherwise axum answers HEAD with the GET handler.
                    .head(handlers::not_found)
                    .fallback(handlers::not_found),
            )
            .fallback(handlers::not_found)
            // Ingest enforces its own size bound while reading.
            .layer(DefaultBodyLimit::disable())
            .with_state(state)
    }

    /// Return the inner [`Router`] (useful for testing with `tower::ServiceExt`).
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve the gateway on the given TCP address.
    pub async fn serve(self, addr: &str) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "gateway listening");
        axum::serve(listener, self.router).await
    }

    /// Serve the gateway with graceful shutdown triggered by the given future.
    ///
    /// When `shutdown` completes, the server stops accepting new connections
    /// and waits for in-flight requests to finish.
    pub async fn serve_with_shutdown(
        self,
        addr: &str,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "gateway listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
