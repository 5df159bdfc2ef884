//! Shared types for chunkgate.
//!
//! This crate defines the [`ChunkKey`] identifier used by every other crate in
//! the workspace, its two textual renderings, and the [`ChunkLimits`] size
//! policy enforced by the gateway:
//!
//! - **wire form**: URL-safe base64 with padding, [`ENCODED_KEY_LEN`] chars.
//!   Used in gateway paths and ingest responses.
//! - **locator form**: lowercase hex, used to derive backend object paths.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use sha2::{Digest, Sha256};

/// Size of a raw chunk key in bytes (one SHA-256 digest).
pub const KEY_LEN: usize = 32;

/// Length of a key rendered in wire form.
///
/// Padded base64 expands every 3 input bytes into 4 output characters.
pub const ENCODED_KEY_LEN: usize = 4 * KEY_LEN.div_ceil(3);

/// Default smallest chunk the gateway accepts (1 MiB).
pub const DEFAULT_MIN_CHUNK_SIZE: u64 = 1024 * 1024;

/// Default largest chunk the gateway accepts (8 MiB).
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

// ---------------------------------------------------------------------------
// ChunkKey
// ---------------------------------------------------------------------------

/// Content-addressed identifier for a chunk: `sha256(chunk_data)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct ChunkKey([u8; KEY_LEN]);

impl ChunkKey {
    /// Create a key by hashing chunk data with SHA-256.
    pub fn from_data(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Finish a running SHA-256 computation into a key.
    pub fn from_hasher(hasher: Sha256) -> Self {
        Self(hasher.finalize().into())
    }

    /// Return the raw 32-byte representation.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Render the key in wire form (URL-safe padded base64).
    pub fn encode(&self) -> String {
        URL_SAFE.encode(self.0)
    }

    /// Parse a key from its wire form.
    ///
    /// The segment must be exactly [`ENCODED_KEY_LEN`] characters and decode
    /// to exactly [`KEY_LEN`] bytes.
    pub fn decode(encoded: &str) -> Result<Self, KeyError> {
        if encoded.len() != ENCODED_KEY_LEN {
            return Err(KeyError::Length {
                expected: ENCODED_KEY_LEN,
                actual: encoded.len(),
            });
        }

        let raw = URL_SAFE
            .decode(encoded)
            .map_err(|e| KeyError::Encoding(e.to_string()))?;

        let bytes: [u8; KEY_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::DecodedLength {
                expected: KEY_LEN,
                actual: raw.len(),
            })?;

        Ok(Self(bytes))
    }

    /// Render the key as lowercase hex, the form used in backend locators.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; KEY_LEN]> for ChunkKey {
    fn from(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for ChunkKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl fmt::Debug for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkKey({})", self.to_hex())
    }
}

impl std::str::FromStr for ChunkKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// Reasons a wire-form key could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// The encoded segment has the wrong number of characters.
    #[error("encoded key must be {expected} characters, got {actual}")]
    Length {
        /// Required encoded length.
        expected: usize,
        /// Observed encoded length.
        actual: usize,
    },

    /// The segment is not valid URL-safe base64.
    #[error("invalid key encoding: {0}")]
    Encoding(String),

    /// The segment decoded to the wrong number of bytes.
    #[error("decoded key must be {expected} bytes, got {actual}")]
    DecodedLength {
        /// Required raw length.
        expected: usize,
        /// Observed raw length.
        actual: usize,
    },
}

// ---------------------------------------------------------------------------
// ChunkLimits
// ---------------------------------------------------------------------------

/// Inclusive size bounds for chunks accepted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLimits {
    /// Smallest accepted chunk in bytes.
    pub min_size: u64,
    /// Largest accepted chunk in bytes.
    pub max_size: u64,
}

impl ChunkLimits {
    /// Create limits, returning `None` if `min_size` is zero or exceeds `max_size`.
    pub fn new(min_size: u64, max_size: u64) -> Option<Self> {
        (min_size > 0 && min_size <= max_size).then_some(Self { min_size, max_size })
    }

    /// Number of body bytes to read before deciding a body is too large.
    ///
    /// One byte past the maximum is enough to tell "exactly max" from "over".
    pub fn read_limit(&self) -> u64 {
        self.max_size.saturating_add(1)
    }
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_MIN_CHUNK_SIZE,
            max_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}
