//! Chaos tests: backend and gateway outages during an upload.
//!
//! An upload must fail cleanly when a single chunk cannot be stored, and a
//! retry once the backend recovers must produce the same chunks.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use chunkgate_cas::ChunkerConfig;
use chunkgate_integration_tests::{GatewayHandle, permissive_limits, test_data};
use chunkgate_store::MemoryBackend;
use chunkgate_upload::{ChunkClient, UploadError, UploadOptions, UploadPipeline};

const SMALL: ChunkerConfig = ChunkerConfig {
    min_size: 4 * 1024,
    max_size: 64 * 1024,
    average_bits: 13,
};

fn options() -> UploadOptions {
    UploadOptions {
        concurrency: 8,
        chunker: SMALL,
        ..UploadOptions::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_backend_fault_fails_upload_then_recovers() {
    let backend = Arc::new(MemoryBackend::new());
    let gateway = GatewayHandle::spawn(backend.clone(), permissive_limits()).await;
    let pipeline = UploadPipeline::new(Arc::new(gateway.client()), options()).unwrap();
    let data = test_data(256 * 1024);

    backend.fail_next(1);
    let err = pipeline.run(Cursor::new(data.clone())).await.unwrap_err();
    assert!(
        matches!(err, UploadError::Rejected { status: 500, .. }),
        "{err:?}"
    );

    let report = pipeline.run(Cursor::new(data.clone())).await.unwrap();
    assert_eq!(report.total_bytes, data.len() as u64);

    let client = gateway.client();
    for chunk in &report.chunks {
        assert!(client.get(&chunk.key).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn test_gateway_down_fails_with_transport_error() {
    let gateway =
        GatewayHandle::spawn(Arc::new(MemoryBackend::new()), permissive_limits()).await;
    let client = ChunkClient::new(&gateway.endpoint()).unwrap();
    drop(gateway);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let pipeline = UploadPipeline::new(Arc::new(client), options()).unwrap();
    let err = pipeline
        .run(Cursor::new(test_data(64 * 1024)))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Http(_)), "{err:?}");
}
