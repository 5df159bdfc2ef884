//! Content-defined chunking.
//!
//! This crate provides:
//! - [`Pol`]: a polynomial over GF(2) that parameterises the rolling hash.
//! - [`Chunker`]: splits a byte stream into variable-size chunks whose
//!   boundaries are chosen by a Rabin fingerprint of a 64-byte sliding window.
//! - [`ChunkIter`]: the lazy iterator returned by [`Chunker::chunk`].
//!
//! Boundaries depend only on local content, so inserting or removing bytes
//! early in a stream leaves the chunks after the edit unchanged once the
//! window has resynchronised. That property is what makes chunk-level
//! deduplication effective for near-duplicate payloads.
//!
//! **The polynomial and [`ChunkerConfig`] must stay fixed for a deployment**,
//! otherwise the same data produces different boundaries and nothing dedups.

mod chunker;
mod error;
mod polynomial;

pub use chunker::{Chunk, ChunkIter, Chunker, ChunkerConfig, WINDOW_SIZE};
pub use error::CasError;
pub use polynomial::Pol;

/// The polynomial used when none is configured.
pub const DEFAULT_POLYNOMIAL: Pol = Pol::new(0x3DA3_358B_4DC1_73);
