//! S3-compatible object-store backend.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chunkgate_types::ChunkKey;
use reqwest::{Method, StatusCode};
use tracing::debug;

use crate::backend::ChunkBackend;
use crate::error::StoreError;
use crate::signer::RequestSigner;

/// Where chunk objects live: `{scheme}://{host}/{bucket}/{hex(key)}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendLocator {
    scheme: String,
    host: String,
    bucket: String,
}

impl BackendLocator {
    /// Locate objects in `bucket` on `host`, over HTTPS.
    pub fn new(host: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            scheme: "https".to_owned(),
            host: host.into(),
            bucket: bucket.into(),
        }
    }

    /// Use a different URL scheme (e.g. `http` for a local emulator).
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// The backend host, possibly with a port.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The bucket holding chunk objects.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Full URL of the object holding `key`.
    ///
    /// Derived from the raw key bytes, never from the wire encoding.
    pub fn object_url(&self, key: &ChunkKey) -> String {
        format!(
            "{}://{}/{}/{}",
            self.scheme,
            self.host,
            self.bucket,
            key.to_hex()
        )
    }
}

/// Chunk backend talking to an S3-compatible store over HTTP.
pub struct S3Backend {
    client: reqwest::Client,
    locator: BackendLocator,
    signer: Arc<dyn RequestSigner>,
}

impl S3Backend {
    /// Create a backend with its own HTTP client.
    ///
    /// Without a `timeout`, a backend call waits as long as the backend does.
    pub fn new(
        locator: BackendLocator,
        signer: Arc<dyn RequestSigner>,
        timeout: Option<Duration>,
    ) -> Result<Self, StoreError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?, locator, signer))
    }

    /// Create a backend sharing an existing HTTP client.
    pub fn with_client(
        client: reqwest::Client,
        locator: BackendLocator,
        signer: Arc<dyn RequestSigner>,
    ) -> Self {
        Self {
            client,
            locator,
            signer,
        }
    }

    /// The object locator in use.
    pub fn locator(&self) -> &BackendLocator {
        &self.locator
    }

    /// Build, sign and send one request.
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Bytes>,
    ) -> Result<reqwest::Response, StoreError> {
        let mut builder = self.client.request(method, url);
        if let Some(body) = body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(body);
        }

        let mut request = builder.build()?;
        self.signer.sign(&mut request)?;
        Ok(self.client.execute(request).await?)
    }
}

#[async_trait::async_trait]
impl ChunkBackend for S3Backend {
    async fn exists(&self, key: ChunkKey) -> Result<bool, StoreError> {
        let url = self.locator.object_url(&key);
        let resp = self.send(Method::HEAD, &url, None).await?;
        let status = resp.status();
        debug!(%url, %status, "backend probe");

        match status {
            StatusCode::OK => Ok(true),
            // Stores without list permission answer 403 for missing objects.
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(false),
            other => Err(StoreError::UnexpectedStatus {
                status: other.as_u16(),
                url,
            }),
        }
    }

    async fn fetch(&self, key: ChunkKey) -> Result<Option<Bytes>, StoreError> {
        let url = self.locator.object_url(&key);
        let resp = self.send(Method::GET, &url, None).await?;
        let status = resp.status();
        debug!(%url, %status, "backend fetch");

        match status {
            StatusCode::OK => Ok(Some(resp.bytes().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            other => Err(StoreError::UnexpectedStatus {
                status: other.as_u16(),
                url,
            }),
        }
    }

    async fn store(&self, key: ChunkKey, data: Bytes) -> Result<(), StoreError> {
        let url = self.locator.object_url(&key);
        let size = data.len();
        let resp = self.send(Method::PUT, &url, Some(data)).await?;
        let status = resp.status();
        debug!(%url, %status, size, "backend store");

        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(StoreError::WriteRejected {
            status: status.as_u16(),
            url,
            body,
        })
    }
}
