//! Shared test harness for chunkgate integration tests.
//!
//! Provides:
//! - [`GatewayHandle`]: a gateway served on a loopback port, over any backend.
//! - [`MockS3`]: an in-process S3 stand-in the real [`S3Backend`] can talk to.
//! - Deterministic test data generators.
//!
//! [`S3Backend`]: chunkgate_store::S3Backend

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use bytes::Bytes;
use chunkgate_gateway::{GatewayServer, GatewayServerConfig};
use chunkgate_store::ChunkBackend;
use chunkgate_types::ChunkLimits;
use chunkgate_upload::ChunkClient;
use tokio::task::JoinHandle;

// =========================================================================
// Gateway
// =========================================================================

/// A gateway serving on `127.0.0.1` until dropped.
pub struct GatewayHandle {
    /// Bound address.
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl GatewayHandle {
    /// Serve a gateway over `backend` with the default `objects` prefix.
    pub async fn spawn(backend: Arc<dyn ChunkBackend>, limits: ChunkLimits) -> Self {
        let mut config = GatewayServerConfig::new(backend);
        config.limits = limits;
        let server = GatewayServer::new(config).unwrap();

        // Bind the listener ourselves so we can discover the actual port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, server.into_router()).await.ok();
        });

        Self { addr, task }
    }

    /// Resource endpoint for [`ChunkClient`].
    pub fn endpoint(&self) -> String {
        format!("http://{}/objects", self.addr)
    }

    /// A client for this gateway.
    pub fn client(&self) -> ChunkClient {
        ChunkClient::new(&self.endpoint()).unwrap()
    }
}

impl Drop for GatewayHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Limits that accept every non-empty chunk the default chunker produces.
pub fn permissive_limits() -> ChunkLimits {
    ChunkLimits::new(1, chunkgate_types::DEFAULT_MAX_CHUNK_SIZE).unwrap()
}

// =========================================================================
// Mock S3
// =========================================================================

/// One request as received by [`MockS3`].
#[derive(Debug, Clone)]
pub struct SeenRequest {
    /// HTTP method.
    pub method: Method,
    /// Request path, `/{bucket}/{object}`.
    pub path: String,
    /// Request headers.
    pub headers: HeaderMap,
}

/// Minimal S3-compatible object store.
///
/// Objects live in memory keyed by path. `head_status` forces the status of
/// every HEAD probe, e.g. 403 to mimic a bucket without list permission.
#[derive(Default)]
pub struct MockS3 {
    objects: Mutex<HashMap<String, Bytes>>,
    head_status: Mutex<Option<StatusCode>>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl MockS3 {
    /// Serve a fresh mock on a loopback port.
    pub async fn spawn() -> (Arc<Self>, SocketAddr, JoinHandle<()>) {
        let mock = Arc::new(Self::default());
        let app = Router::new()
            .route("/{bucket}/{object}", any(mock_s3_handler))
            .with_state(Arc::clone(&mock));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        (mock, addr, task)
    }

    /// Force the status of HEAD responses (`None` restores normal behaviour).
    pub fn set_head_status(&self, status: Option<StatusCode>) {
        *self.head_status.lock().unwrap() = status;
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    /// Number of requests received with the given method.
    pub fn count(&self, method: &Method) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == *method)
            .count()
    }

    /// Stored object paths.
    pub fn object_paths(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

async fn mock_s3_handler(
    State(mock): State<Arc<MockS3>>,
    method: Method,
    Path((bucket, object)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = format!("/{bucket}/{object}");
    mock.seen.lock().unwrap().push(SeenRequest {
        method: method.clone(),
        path: path.clone(),
        headers,
    });

    let mut objects = mock.objects.lock().unwrap();
    match method {
        Method::HEAD => {
            if let Some(status) = *mock.head_status.lock().unwrap() {
                return status.into_response();
            }
            if objects.contains_key(&path) {
                StatusCode::OK.into_response()
            } else {
                StatusCode::NOT_FOUND.into_response()
            }
        }
        Method::GET => match objects.get(&path) {
            Some(data) => (StatusCode::OK, data.clone()).into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        },
        Method::PUT => {
            objects.insert(path, body);
            StatusCode::OK.into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

// =========================================================================
// Test data
// =========================================================================

/// Generate deterministic, non-repeating test data.
pub fn test_data(size: usize) -> Vec<u8> {
    test_data_seeded(size, 0xDEAD_BEEF)
}

/// Generate test data with a specific seed (for unrelated payloads).
pub fn test_data_seeded(size: usize, seed: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = seed;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}
