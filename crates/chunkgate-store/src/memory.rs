//! In-memory chunk backend.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use bytes::Bytes;
use chunkgate_types::ChunkKey;
use tracing::debug;

use crate::backend::ChunkBackend;
use crate::error::StoreError;

/// Number of calls each backend operation has received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    /// Calls to [`ChunkBackend::exists`].
    pub exists: u64,
    /// Calls to [`ChunkBackend::fetch`].
    pub fetch: u64,
    /// Calls to [`ChunkBackend::store`].
    pub store: u64,
}

/// In-memory chunk backend backed by a `RwLock<HashMap>`.
///
/// Used by tests and by the daemon's memory mode. Counts every operation so
/// callers can assert which backend calls a request made, and can be told to
/// fail the next few operations to exercise outage paths.
#[derive(Default)]
pub struct MemoryBackend {
    objects: RwLock<HashMap<ChunkKey, Bytes>>,
    exists_calls: AtomicU64,
    fetch_calls: AtomicU64,
    store_calls: AtomicU64,
    pending_faults: AtomicU32,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` operations fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, n: u32) {
        self.pending_faults.store(n, Ordering::SeqCst);
    }

    /// Snapshot of the operation counters.
    pub fn op_counts(&self) -> OpCounts {
        OpCounts {
            exists: self.exists_calls.load(Ordering::SeqCst),
            fetch: self.fetch_calls.load(Ordering::SeqCst),
            store: self.store_calls.load(Ordering::SeqCst),
        }
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Whether the backend holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check for a chunk without touching the operation counters.
    pub fn contains(&self, key: &ChunkKey) -> bool {
        self.objects.read().expect("lock poisoned").contains_key(key)
    }

    fn take_fault(&self) -> Result<(), StoreError> {
        let injected = self
            .pending_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if injected {
            return Err(StoreError::Unavailable("injected fault".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChunkBackend for MemoryBackend {
    async fn exists(&self, key: ChunkKey) -> Result<bool, StoreError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        self.take_fault()?;
        Ok(self.contains(&key))
    }

    async fn fetch(&self, key: ChunkKey) -> Result<Option<Bytes>, StoreError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.take_fault()?;
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(&key).cloned())
    }

    async fn store(&self, key: ChunkKey, data: Bytes) -> Result<(), StoreError> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        self.take_fault()?;

        let mut map = self.objects.write().expect("lock poisoned");
        debug!(key = %key, size = data.len(), "storing chunk in memory");
        // Objects are immutable once written.
        map.entry(key).or_insert(data);
        Ok(())
    }
}
