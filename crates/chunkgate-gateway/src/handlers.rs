//! Chunk gateway request handlers.

use axum::body::Body;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::{Response, StatusCode};
use bytes::Bytes;
use chunkgate_types::{ChunkKey, ChunkLimits, KeyError};
use http_body_util::BodyExt;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::error::GatewayError;

// -----------------------------------------------------------------------
// POST /{prefix}/: ingest
// -----------------------------------------------------------------------

/// Upper bound on the buffer reserved before any body bytes arrive.
const INITIAL_BUF_CAPACITY: u64 = 64 * 1024;

/// Bytes to reserve for an ingest body before its first frame arrives.
pub(crate) fn initial_capacity(limits: &ChunkLimits) -> usize {
    limits.min_size.min(INITIAL_BUF_CAPACITY) as usize
}

/// Read at most `limits.read_limit()` bytes of `body`, hashing as we go.
///
/// Stops reading as soon as the body is known to be too large, so an
/// oversized upload is neither buffered nor hashed past that point.
async fn read_bounded(
    mut body: Body,
    limits: ChunkLimits,
) -> Result<(Bytes, ChunkKey), GatewayError> {
    let limit = limits.read_limit();
    let mut buf: Vec<u8> = Vec::with_capacity(initial_capacity(&limits));
    let mut hasher = Sha256::new();

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| GatewayError::BodyRead(e.to_string()))?;
        let Ok(data) = frame.into_data() else {
            continue;
        };

        let room = (limit - buf.len() as u64) as usize;
        let take = data.len().min(room);
        hasher.update(&data[..take]);
        buf.extend_from_slice(&data[..take]);

        if buf.len() as u64 > limits.max_size {
            return Err(GatewayError::ChunkTooLarge {
                max: limits.max_size,
            });
        }
    }

    let size = buf.len() as u64;
    if size < limits.min_size {
        return Err(GatewayError::ChunkTooSmall {
            size,
            min: limits.min_size,
        });
    }

    Ok((Bytes::from(buf), ChunkKey::from_hasher(hasher)))
}

/// Store a chunk under the hash of its bytes and return the encoded key.
///
/// The response body is `"{key}\n"`. If the backend already holds the key,
/// nothing is written.
#[tracing::instrument(
    skip(state, body),
    fields(key = tracing::field::Empty, size = tracing::field::Empty, dedup = tracing::field::Empty)
)]
pub(crate) async fn ingest_handler(
    State(state): State<AppState>,
    body: Body,
) -> Result<Response<Body>, GatewayError> {
    let (data, key) = match read_bounded(body, state.limits).await {
        Ok(read) => read,
        Err(e) => {
            debug!(code = e.code(), error = %e, "ingest rejected");
            return Err(e);
        }
    };

    let span = tracing::Span::current();
    span.record("key", tracing::field::display(&key));
    span.record("size", data.len() as u64);

    let exists = state.backend.exists(key).await.map_err(|e| {
        error!(code = "backend_error", error = %e, "existence check failed");
        GatewayError::Backend(e)
    })?;

    span.record("dedup", exists);

    if !exists {
        let size = data.len();
        state.backend.store(key, data).await.map_err(|e| {
            error!(code = "backend_error", error = %e, "chunk store failed");
            GatewayError::Backend(e)
        })?;
        info!(%key, size, "chunk stored");
    } else {
        info!(%key, "chunk already present");
    }

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/plain; charset=utf-8")
        .body(Body::from(format!("{key}\n")))
        .unwrap())
}

// -----------------------------------------------------------------------
// GET /{prefix}/{key}: fetch
// -----------------------------------------------------------------------

/// Return the bytes stored under an encoded key.
///
/// Malformed keys, including segments that do not percent-decode to UTF-8,
/// are rejected before the backend is contacted.
#[tracing::instrument(
    skip_all,
    fields(key = tracing::field::Empty, content_length = tracing::field::Empty)
)]
pub(crate) async fn fetch_handler(
    State(state): State<AppState>,
    key: Result<Path<String>, PathRejection>,
) -> Result<Response<Body>, GatewayError> {
    let key = key
        .map_err(|e| KeyError::Encoding(e.body_text()))
        .and_then(|Path(key)| ChunkKey::decode(&key))
        .map_err(|e| {
            debug!(code = "invalid_key", error = %e, "fetch rejected");
            GatewayError::InvalidKey(e)
        })?;
    tracing::Span::current().record("key", tracing::field::display(&key));

    let data = match state.backend.fetch(key).await {
        Ok(Some(data)) => data,
        Ok(None) => {
            debug!(code = "no_such_chunk", %key, "chunk not found");
            return Err(GatewayError::NoSuchChunk);
        }
        Err(e) => {
            warn!(code = "backend_unavailable", %key, error = %e, "chunk fetch failed");
            return Err(GatewayError::BackendUnavailable(e));
        }
    };

    tracing::Span::current().record("content_length", data.len() as u64);

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/octet-stream")
        .header("content-length", data.len().to_string())
        .body(Body::from(data))
        .unwrap())
}

/// Answer every unrouted method and path.
pub(crate) async fn not_found() -> GatewayError {
    GatewayError::RouteNotFound
}
