//! Error types for uploads and gateway client calls.

use chunkgate_cas::CasError;
use chunkgate_types::{ChunkKey, KeyError};

/// Errors that can occur while chunking or uploading.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The source could not be chunked.
    #[error("chunking error: {0}")]
    Chunking(#[from] CasError),

    /// The gateway could not be reached or its response could not be read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with a non-success status.
    #[error("gateway rejected request with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The gateway's ingest response is not an encoded key.
    #[error("invalid key in gateway response: {0}")]
    InvalidResponse(#[from] KeyError),

    /// The gateway stored the chunk under a different key than we computed.
    #[error("key mismatch: computed {expected}, gateway returned {actual}")]
    KeyMismatch {
        /// Key computed locally from the chunk bytes.
        expected: ChunkKey,
        /// Key the gateway returned.
        actual: ChunkKey,
    },

    /// The gateway endpoint is not a usable URL.
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),

    /// Concurrency must be at least one.
    #[error("concurrency must be at least 1")]
    InvalidConcurrency,

    /// A pipeline task ended without reporting a result.
    #[error("upload aborted: {0}")]
    Aborted(String),
}
