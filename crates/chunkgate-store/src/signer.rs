//! AWS Signature V4 signing for outgoing backend requests.
//!
//! Implements the client side of the [AWS Signature Version 4 signing
//! process][sigv4] so the backend can be any S3-compatible object store.
//!
//! [sigv4]: https://docs.aws.amazon.com/AmazonS3/latest/API/sig-v4-authenticating-requests.html

use std::fmt;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, HOST, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};

use crate::error::StoreError;

type HmacSha256 = Hmac<Sha256>;

/// Payload hash sent when the body is a stream we cannot hash up front.
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Capability that authenticates a backend request before it is sent.
///
/// The gateway holds exactly one signer for its lifetime and applies it to
/// every backend request.
pub trait RequestSigner: Send + Sync {
    /// Add authentication headers to `request`.
    fn sign(&self, request: &mut reqwest::Request) -> Result<(), StoreError>;
}

/// Static AWS credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Access key id, sent in clear in the credential scope.
    pub access_key_id: String,
    /// Secret key, used only to derive signing keys.
    pub secret_access_key: String,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,
}

impl Credentials {
    /// Create long-term credentials (no session token).
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Attach a session token.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Signs requests for the `s3` service with AWS Signature V4.
#[derive(Debug, Clone)]
pub struct SigV4Signer {
    credentials: Credentials,
    region: String,
}

impl SigV4Signer {
    /// Create a signer for the given region.
    pub fn new(credentials: Credentials, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    /// Sign `request` as if sent at `now`.
    ///
    /// Every header present on the request at this point is signed, together
    /// with `host`, `x-amz-date`, `x-amz-content-sha256` and (for temporary
    /// credentials) `x-amz-security-token`.
    pub fn sign_at(
        &self,
        request: &mut reqwest::Request,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let payload_hash = match request.body() {
            None => hex::encode(Sha256::digest(b"")),
            Some(body) => match body.as_bytes() {
                Some(bytes) => hex::encode(Sha256::digest(bytes)),
                None => UNSIGNED_PAYLOAD.to_owned(),
            },
        };

        let url = request.url();
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_owned(),
            (None, _) => return Err(StoreError::Signing(format!("no host in {url}"))),
        };
        let path = url.path().to_owned();
        let query = url.query().unwrap_or("").to_owned();
        let method = request.method().as_str().to_owned();

        let headers = request.headers_mut();
        headers.insert(HOST, header_value(&host)?);
        headers.insert(
            HeaderName::from_static("x-amz-date"),
            header_value(&timestamp)?,
        );
        headers.insert(
            HeaderName::from_static("x-amz-content-sha256"),
            header_value(&payload_hash)?,
        );
        if let Some(token) = &self.credentials.session_token {
            headers.insert(
                HeaderName::from_static("x-amz-security-token"),
                header_value(token)?,
            );
        }

        // Header names from `HeaderMap` are already lowercase.
        let mut signed: Vec<(String, String)> = Vec::with_capacity(headers.len());
        for (name, value) in headers.iter() {
            let value = value
                .to_str()
                .map_err(|_| StoreError::Signing(format!("header {name} is not visible ASCII")))?;
            signed.push((name.as_str().to_owned(), value.to_owned()));
        }
        let mut signed_headers: Vec<String> = signed.iter().map(|(n, _)| n.clone()).collect();
        signed_headers.sort();
        signed_headers.dedup();

        let canonical_request = build_canonical_request(
            &method,
            &path,
            &query,
            &signed,
            &signed_headers,
            &payload_hash,
        );

        let scope = format!("{date}/{}/s3/aws4_request", self.region);
        let string_to_sign = build_string_to_sign(&timestamp, &scope, &canonical_request);
        let signing_key =
            derive_signing_key(&self.credentials.secret_access_key, &date, &self.region);
        let signature = compute_signature(&signing_key, &string_to_sign);

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={}, Signature={signature}",
            self.credentials.access_key_id,
            signed_headers.join(";"),
        );
        headers.insert(AUTHORIZATION, header_value(&authorization)?);

        Ok(())
    }
}

impl RequestSigner for SigV4Signer {
    fn sign(&self, request: &mut reqwest::Request) -> Result<(), StoreError> {
        self.sign_at(request, Utc::now())
    }
}

fn header_value(value: &str) -> Result<HeaderValue, StoreError> {
    HeaderValue::from_str(value).map_err(|e| StoreError::Signing(e.to_string()))
}

/// Build the canonical request string.
///
/// ```text
/// <HTTPMethod>\n
/// <CanonicalURI>\n
/// <CanonicalQueryString>\n
/// <CanonicalHeaders>\n
/// <SignedHeaders>\n
/// <HashedPayload>
/// ```
fn build_canonical_request(
    method: &str,
    uri: &str,
    query: &str,
    headers: &[(String, String)],
    signed_headers: &[String],
    payload_hash: &str,
) -> String {
    let canonical_uri = if uri.is_empty() { "/" } else { uri };
    let canonical_query = canonical_query_string(query);

    let mut header_map: Vec<(&str, &str)> = headers
        .iter()
        .filter(|(name, _)| signed_headers.contains(name))
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    header_map.sort_by_key(|(name, _)| *name);

    let mut canonical_headers = String::new();
    for (name, value) in &header_map {
        canonical_headers.push_str(name);
        canonical_headers.push(':');
        canonical_headers.push_str(value.trim());
        canonical_headers.push('\n');
    }

    format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{}\n{payload_hash}",
        signed_headers.join(";"),
    )
}

/// Sort query parameters by key for the canonical query string.
fn canonical_query_string(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    let mut pairs: Vec<(&str, &str)> = query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the "string to sign".
///
/// ```text
/// AWS4-HMAC-SHA256\n
/// <timestamp>\n
/// <scope>\n
/// <hex(SHA256(canonical_request))>
/// ```
fn build_string_to_sign(timestamp: &str, scope: &str, canonical_request: &str) -> String {
    let hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    format!("AWS4-HMAC-SHA256\n{timestamp}\n{scope}\n{hash}")
}

/// Derive the signing key via the HMAC chain:
///
/// ```text
/// DateKey    = HMAC-SHA256("AWS4" + secret, date)
/// RegionKey  = HMAC-SHA256(DateKey, region)
/// ServiceKey = HMAC-SHA256(RegionKey, "s3")
/// SigningKey = HMAC-SHA256(ServiceKey, "aws4_request")
/// ```
fn derive_signing_key(secret: &str, date: &str, region: &str) -> Vec<u8> {
    let key = format!("AWS4{secret}");

    let date_key = hmac_sha256(key.as_bytes(), date.as_bytes());
    let region_key = hmac_sha256(&date_key, region.as_bytes());
    let service_key = hmac_sha256(&region_key, b"s3");
    hmac_sha256(&service_key, b"aws4_request")
}

fn compute_signature(signing_key: &[u8], string_to_sign: &str) -> String {
    hex::encode(hmac_sha256(signing_key, string_to_sign.as_bytes()))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
