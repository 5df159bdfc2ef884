//! Error types for chunking operations.

/// Errors that can occur while chunking a stream.
#[derive(Debug, thiserror::Error)]
pub enum CasError {
    /// Reading from the underlying source failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The polynomial cannot drive the rolling hash.
    #[error("invalid polynomial {pol}: {reason}")]
    InvalidPolynomial {
        /// The rejected polynomial, rendered as hex.
        pol: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The chunk size parameters are inconsistent.
    #[error("invalid chunker config: {0}")]
    InvalidConfig(String),
}
