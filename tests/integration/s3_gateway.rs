//! Gateway over the S3 backend.
//!
//! Runs the whole stack against an in-process S3 stand-in: client, gateway,
//! signed backend requests, object store.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use chunkgate_integration_tests::{GatewayHandle, MockS3, permissive_limits, test_data_seeded};
use chunkgate_store::{BackendLocator, Credentials, S3Backend, SigV4Signer};
use chunkgate_types::ChunkKey;

const BUCKET: &str = "chunks";

async fn setup() -> (GatewayHandle, Arc<MockS3>, tokio::task::JoinHandle<()>) {
    let (mock, addr, mock_task) = MockS3::spawn().await;

    let locator = BackendLocator::new(addr.to_string(), BUCKET).with_scheme("http");
    let signer = SigV4Signer::new(Credentials::new("AKIDEXAMPLE", "secret"), "eu-west-1");
    let backend =
        S3Backend::new(locator, Arc::new(signer), Some(Duration::from_secs(5))).unwrap();

    let gateway = GatewayHandle::spawn(Arc::new(backend), permissive_limits()).await;
    (gateway, mock, mock_task)
}

#[tokio::test]
async fn test_chunk_stored_under_hex_object_name() {
    let (gateway, mock, mock_task) = setup().await;
    let client = gateway.client();
    let data = test_data_seeded(4096, 1);

    let key = client.put(data.clone().into()).await.unwrap();
    assert_eq!(key, ChunkKey::from_data(&data));

    let expected_path = format!("/{BUCKET}/{}", key.to_hex());
    assert_eq!(mock.object_paths(), vec![expected_path.clone()]);

    let requests = mock.requests();
    let methods: Vec<_> = requests.iter().map(|r| r.method.clone()).collect();
    assert_eq!(methods, vec![Method::HEAD, Method::PUT]);
    for request in &requests {
        assert_eq!(request.path, expected_path);
        let auth = request.headers["authorization"].to_str().unwrap();
        assert!(
            auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"),
            "{auth}"
        );
        assert!(auth.contains("/eu-west-1/s3/aws4_request"), "{auth}");
        assert!(request.headers.contains_key("x-amz-date"));
        assert!(request.headers.contains_key("x-amz-content-sha256"));
    }

    let fetched = client.get(&key).await.unwrap().unwrap();
    assert_eq!(fetched, data);
    assert_eq!(mock.count(&Method::GET), 1);

    mock_task.abort();
}

#[tokio::test]
async fn test_duplicate_ingest_writes_once() {
    let (gateway, mock, mock_task) = setup().await;
    let client = gateway.client();
    let data = test_data_seeded(2048, 2);

    let first = client.put(data.clone().into()).await.unwrap();
    let second = client.put(data.into()).await.unwrap();
    assert_eq!(first, second);

    assert_eq!(mock.count(&Method::HEAD), 2);
    assert_eq!(mock.count(&Method::PUT), 1);

    mock_task.abort();
}

/// Buckets without list permission answer 403 for missing objects. The
/// gateway treats that as absent and writes the chunk.
#[tokio::test]
async fn test_forbidden_probe_still_writes() {
    let (gateway, mock, mock_task) = setup().await;
    mock.set_head_status(Some(StatusCode::FORBIDDEN));
    let client = gateway.client();

    client.put(test_data_seeded(1024, 3).into()).await.unwrap();
    assert_eq!(mock.count(&Method::PUT), 1);
    assert_eq!(mock.object_paths().len(), 1);

    mock_task.abort();
}

/// An unexpected probe status fails the ingest without writing.
#[tokio::test]
async fn test_probe_server_error_fails_ingest() {
    let (gateway, mock, mock_task) = setup().await;
    mock.set_head_status(Some(StatusCode::SERVICE_UNAVAILABLE));
    let client = gateway.client();

    let err = client.put(test_data_seeded(1024, 4).into()).await.unwrap_err();
    assert!(
        matches!(err, chunkgate_upload::UploadError::Rejected { status: 500, .. }),
        "{err:?}"
    );
    assert_eq!(mock.count(&Method::PUT), 0);

    mock_task.abort();
}

/// Fetching a chunk the store has never seen is a 404.
#[tokio::test]
async fn test_fetch_missing_object() {
    let (gateway, mock, mock_task) = setup().await;
    let key = ChunkKey::from_data(b"nothing here");

    assert!(gateway.client().get(&key).await.unwrap().is_none());
    assert_eq!(mock.count(&Method::GET), 1);

    mock_task.abort();
}
