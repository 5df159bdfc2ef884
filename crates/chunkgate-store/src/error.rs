//! Error types for backend store operations.

/// Errors that can occur while talking to a chunk backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend answered a probe or read with a status we do not map.
    #[error("unexpected status {status} from backend for {url}")]
    UnexpectedStatus {
        /// HTTP status code returned by the backend.
        status: u16,
        /// Object locator the request was sent to.
        url: String,
    },

    /// The backend refused a write.
    #[error("backend rejected write to {url} with status {status}: {body}")]
    WriteRejected {
        /// HTTP status code returned by the backend.
        status: u16,
        /// Object locator the request was sent to.
        url: String,
        /// Response body, kept for diagnostics.
        body: String,
    },

    /// The request could not be sent or the response could not be read.
    #[error("backend transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The request could not be signed.
    #[error("request signing failed: {0}")]
    Signing(String),

    /// The backend is unavailable (used by in-process backends).
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}
