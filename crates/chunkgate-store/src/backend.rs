//! Core trait for chunk storage backends.

use bytes::Bytes;
use chunkgate_types::ChunkKey;

use crate::error::StoreError;

/// Trait for probing, reading and writing content-addressed chunks.
///
/// Objects are write-once: a key is only ever stored with the bytes it was
/// derived from, so storing an existing key is a no-op in effect.
/// All implementations must be `Send + Sync` for use across request tasks.
#[async_trait::async_trait]
pub trait ChunkBackend: Send + Sync {
    /// Check whether a chunk exists.
    ///
    /// A probe the backend refuses to answer (403) counts as absent.
    async fn exists(&self, key: ChunkKey) -> Result<bool, StoreError>;

    /// Retrieve a chunk. Returns `None` if not found.
    async fn fetch(&self, key: ChunkKey) -> Result<Option<Bytes>, StoreError>;

    /// Store a chunk under its key.
    async fn store(&self, key: ChunkKey, data: Bytes) -> Result<(), StoreError>;
}
