//! Gateway error types and their HTTP mapping.

use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;
use chunkgate_store::StoreError;
use chunkgate_types::KeyError;

/// Errors returned by gateway handlers.
///
/// Every variant maps to a status code and a short machine-readable code.
/// Response bodies carry only the code, never backend details.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The body is shorter than the minimum chunk size.
    #[error("chunk of {size} bytes is below the minimum of {min}")]
    ChunkTooSmall {
        /// Bytes received.
        size: u64,
        /// Configured minimum.
        min: u64,
    },

    /// The body exceeded the maximum chunk size.
    #[error("chunk exceeds the maximum of {max} bytes")]
    ChunkTooLarge {
        /// Configured maximum.
        max: u64,
    },

    /// The request body could not be read to completion.
    #[error("failed to read request body: {0}")]
    BodyRead(String),

    /// The path segment is not a valid encoded key.
    #[error("invalid chunk key: {0}")]
    InvalidKey(#[from] KeyError),

    /// No chunk is stored under the requested key.
    #[error("no such chunk")]
    NoSuchChunk,

    /// The backend failed while serving a read.
    ///
    /// Reported to the client as a missing chunk.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[source] StoreError),

    /// The backend failed while probing or storing during ingest.
    #[error("backend error: {0}")]
    Backend(#[from] StoreError),

    /// No route matches the method and path.
    #[error("not found")]
    RouteNotFound,
}

impl GatewayError {
    /// Map to an HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ChunkTooSmall { .. } | Self::ChunkTooLarge { .. } => StatusCode::BAD_REQUEST,
            Self::BodyRead(_) | Self::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidKey(_)
            | Self::NoSuchChunk
            | Self::BackendUnavailable(_)
            | Self::RouteNotFound => StatusCode::NOT_FOUND,
        }
    }

    /// Map to the error code used in response bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ChunkTooSmall { .. } => "chunk_too_small",
            Self::ChunkTooLarge { .. } => "chunk_too_large",
            Self::BodyRead(_) => "body_read_failed",
            Self::InvalidKey(_) => "invalid_key",
            Self::NoSuchChunk => "no_such_chunk",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::Backend(_) => "backend_error",
            Self::RouteNotFound => "not_found",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        // Fetch failures all look like a missing chunk from the outside.
        let code = match self {
            Self::InvalidKey(_) | Self::BackendUnavailable(_) => "no_such_chunk",
            _ => self.code(),
        };

        Response::builder()
            .status(self.status_code())
            .header("content-type", "text/plain; charset=utf-8")
            .body(Body::from(format!("{code}\n")))
            .unwrap()
    }
}

/// A route prefix that cannot be mounted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid route prefix {0:?}: use one path segment of [A-Za-z0-9._-]")]
pub struct InvalidPrefix(pub String);
