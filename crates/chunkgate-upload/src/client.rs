//! HTTP client for a chunk gateway.

use bytes::Bytes;
use chunkgate_types::ChunkKey;
use reqwest::{StatusCode, Url};
use tracing::debug;

use crate::error::UploadError;

/// Destination for uploaded chunks.
///
/// [`ChunkClient`] is the production implementation; the pipeline only
/// needs this seam.
#[async_trait::async_trait]
pub trait ChunkSink: Send + Sync {
    /// Upload one chunk and return the key the receiver assigned to it.
    async fn put(&self, data: Bytes) -> Result<ChunkKey, UploadError>;
}

/// Client for a gateway resource such as `http://host:8080/objects`.
#[derive(Debug, Clone)]
pub struct ChunkClient {
    http: reqwest::Client,
    base: String,
}

impl ChunkClient {
    /// Create a client for the given resource endpoint.
    pub fn new(endpoint: &str) -> Result<Self, UploadError> {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    /// Create a client sharing an existing HTTP client.
    pub fn with_client(http: reqwest::Client, endpoint: &str) -> Result<Self, UploadError> {
        let url = Url::parse(endpoint).map_err(|_| UploadError::InvalidEndpoint(endpoint.into()))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(UploadError::InvalidEndpoint(endpoint.into()));
        }

        Ok(Self {
            http,
            base: endpoint.trim_end_matches('/').to_owned(),
        })
    }

    /// The resource endpoint, without a trailing slash.
    pub fn endpoint(&self) -> &str {
        &self.base
    }

    /// Ingest a chunk and return the key parsed from the response.
    pub async fn put(&self, data: Bytes) -> Result<ChunkKey, UploadError> {
        let size = data.len();
        let resp = self
            .http
            .post(format!("{}/", self.base))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if status != StatusCode::OK {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let key = ChunkKey::decode(body.trim_end_matches('\n'))?;
        debug!(%key, size, "chunk uploaded");
        Ok(key)
    }

    /// Fetch a chunk. Returns `None` if the gateway reports it missing.
    pub async fn get(&self, key: &ChunkKey) -> Result<Option<Bytes>, UploadError> {
        let resp = self
            .http
            .get(format!("{}/{}", self.base, key.encode()))
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(Some(resp.bytes().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            other => Err(UploadError::Rejected {
                status: other.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl ChunkSink for ChunkClient {
    async fn put(&self, data: Bytes) -> Result<ChunkKey, UploadError> {
        ChunkClient::put(self, data).await
    }
}
