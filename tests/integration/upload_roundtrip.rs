//! End-to-end upload tests.
//!
//! Chunks local data with the upload pipeline, pushes every chunk through a
//! real gateway over loopback HTTP and reads the chunks back.

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;

use chunkgate_cas::{ChunkerConfig, DEFAULT_POLYNOMIAL};
use chunkgate_integration_tests::{GatewayHandle, permissive_limits, test_data, test_data_seeded};
use chunkgate_store::MemoryBackend;
use chunkgate_types::{ChunkKey, ChunkLimits};
use chunkgate_upload::{UploadError, UploadOptions, UploadPipeline, UploadReport};

const SMALL: ChunkerConfig = ChunkerConfig {
    min_size: 4 * 1024,
    max_size: 64 * 1024,
    average_bits: 13,
};

async fn upload(
    gateway: &GatewayHandle,
    options: UploadOptions,
    data: Vec<u8>,
) -> Result<UploadReport, UploadError> {
    let pipeline = UploadPipeline::new(Arc::new(gateway.client()), options)?;
    pipeline.run(Cursor::new(data)).await
}

/// 12 MB through the default chunker at high concurrency. Every chunk must
/// come back byte-identical, and the chunks must reassemble to the input.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_upload_then_fetch_every_chunk() {
    let backend = Arc::new(MemoryBackend::new());
    let gateway = GatewayHandle::spawn(backend.clone(), permissive_limits()).await;
    let data = test_data(12 * 1024 * 1024);

    let options = UploadOptions {
        concurrency: 64,
        polynomial: DEFAULT_POLYNOMIAL,
        ..UploadOptions::default()
    };
    let report = upload(&gateway, options, data.clone()).await.unwrap();

    assert!(report.chunks.len() > 1, "12 MB should span several chunks");
    assert_eq!(report.total_bytes, data.len() as u64);

    let client = gateway.client();
    let mut reassembled = Vec::with_capacity(data.len());
    let mut expected_offset = 0u64;
    for chunk in &report.chunks {
        assert_eq!(chunk.offset, expected_offset, "chunks must be in stream order");
        let fetched = client
            .get(&chunk.key)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("chunk at offset {} missing", chunk.offset));
        assert_eq!(fetched.len(), chunk.len);
        assert_eq!(ChunkKey::from_data(&fetched), chunk.key);
        reassembled.extend_from_slice(&fetched);
        expected_offset += chunk.len as u64;
    }
    assert_eq!(reassembled, data);

    let distinct: HashSet<_> = report.chunks.iter().map(|c| c.key).collect();
    assert_eq!(backend.len(), distinct.len());
}

/// Uploading the same data twice stores nothing new.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reupload_deduplicates() {
    let backend = Arc::new(MemoryBackend::new());
    let gateway = GatewayHandle::spawn(backend.clone(), permissive_limits()).await;
    let options = UploadOptions {
        chunker: SMALL,
        ..UploadOptions::default()
    };
    let data = test_data(512 * 1024);

    let first = upload(&gateway, options, data.clone()).await.unwrap();
    let stored = backend.len();
    let writes = backend.op_counts().store;

    let second = upload(&gateway, options, data).await.unwrap();
    assert_eq!(first.chunks, second.chunks);
    assert_eq!(backend.len(), stored);
    assert_eq!(backend.op_counts().store, writes);
}

/// Prepending bytes only disturbs the chunks near the start, so most of the
/// shifted upload is already stored.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shifted_data_mostly_deduplicates() {
    let backend = Arc::new(MemoryBackend::new());
    let gateway = GatewayHandle::spawn(backend.clone(), permissive_limits()).await;
    let options = UploadOptions {
        chunker: SMALL,
        ..UploadOptions::default()
    };
    let data = test_data(1024 * 1024);

    let original = upload(&gateway, options, data.clone()).await.unwrap();
    let known: HashSet<_> = original.chunks.iter().map(|c| c.key).collect();

    let mut shifted = test_data_seeded(100, 42);
    shifted.extend_from_slice(&data);
    let report = upload(&gateway, options, shifted).await.unwrap();

    let reused = report
        .chunks
        .iter()
        .filter(|c| known.contains(&c.key))
        .count();
    assert!(
        reused * 10 >= report.chunks.len() * 8,
        "only {reused} of {} chunks reused",
        report.chunks.len()
    );
}

/// A source shorter than the gateway minimum becomes a single undersized
/// chunk, which the gateway refuses.
#[tokio::test]
async fn test_small_file_rejected_by_default_limits() {
    let backend = Arc::new(MemoryBackend::new());
    let gateway = GatewayHandle::spawn(backend.clone(), ChunkLimits::default()).await;

    let result = upload(&gateway, UploadOptions::default(), test_data(600_000)).await;
    match result {
        Err(UploadError::Rejected { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(body, "chunk_too_small\n");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(backend.is_empty());
}

#[tokio::test]
async fn test_client_put_and_get() {
    let gateway = GatewayHandle::spawn(
        Arc::new(MemoryBackend::new()),
        ChunkLimits::new(64, 4096).unwrap(),
    )
    .await;
    let client = gateway.client();

    let data = test_data(1000);
    let key = client.put(data.clone().into()).await.unwrap();
    assert_eq!(key, ChunkKey::from_data(&data));
    assert_eq!(client.get(&key).await.unwrap().unwrap(), data);

    let missing = ChunkKey::from_data(b"never uploaded");
    assert!(client.get(&missing).await.unwrap().is_none());

    match client.put(test_data(10).into()).await {
        Err(UploadError::Rejected { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(body, "chunk_too_small\n");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}
