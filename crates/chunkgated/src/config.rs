//! TOML configuration for the chunkgate daemon.
//!
//! The file is optional; every field has a default or can come from the
//! command line / environment. [`CliConfig::validate`] turns the merged
//! result into an immutable [`ValidatedConfig`] once at startup.

use std::path::Path;
use std::time::Duration;

use chunkgate_store::{BackendLocator, Credentials};
use chunkgate_types::{ChunkLimits, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MIN_CHUNK_SIZE};
use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// HTTP listener and routing.
    pub server: ServerSection,
    /// Backend object store.
    pub backend: BackendSection,
    /// Accepted chunk sizes.
    pub chunks: ChunksSection,
    /// Backend credentials.
    pub credentials: CredentialsSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[server]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address for the gateway HTTP API.
    pub listen_addr: String,
    /// Path segment the chunk resource is mounted under.
    pub prefix: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            prefix: chunkgate_gateway::DEFAULT_PREFIX.to_string(),
        }
    }
}

/// `[backend]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    /// Region used for request signing and the default host.
    pub region: Option<String>,
    /// Backend host. Defaults to `s3-{region}.amazonaws.com`.
    pub host: Option<String>,
    /// Bucket holding chunk objects.
    pub bucket: Option<String>,
    /// `https` (default) or `http` for local emulators.
    pub scheme: String,
    /// Per-request transport timeout. Unset means wait indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            region: None,
            host: None,
            bucket: None,
            scheme: "https".to_string(),
            timeout_secs: None,
        }
    }
}

/// `[chunks]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ChunksSection {
    /// Smallest accepted chunk in bytes.
    pub min_size: u64,
    /// Largest accepted chunk in bytes.
    pub max_size: u64,
}

impl Default for ChunksSection {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_MIN_CHUNK_SIZE,
            max_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}

/// `[credentials]` section.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct CredentialsSection {
    /// Access key id.
    pub access_key_id: Option<String>,
    /// Secret access key. Never logged.
    pub secret_access_key: Option<String>,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,
}

impl std::fmt::Debug for CredentialsSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsSection")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "<redacted>"))
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Reasons a configuration cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No bucket was configured.
    #[error("backend bucket is required (set [backend] bucket or S3_BUCKET)")]
    MissingBucket,

    /// No region was configured.
    #[error("backend region is required (set [backend] region or AWS_REGION)")]
    MissingRegion,

    /// A credential field is missing.
    #[error("credential {0} is required")]
    MissingCredential(&'static str),

    /// Chunk size bounds are unusable.
    #[error("chunk sizes must satisfy 0 < min_size <= max_size (got {min}..={max})")]
    InvalidChunkSizes {
        /// Configured minimum.
        min: u64,
        /// Configured maximum.
        max: u64,
    },

    /// The route prefix cannot be mounted.
    #[error("invalid route prefix {0:?}")]
    InvalidPrefix(String),

    /// Unsupported URL scheme for the backend.
    #[error("backend scheme must be http or https, got {0:?}")]
    InvalidScheme(String),
}

/// Backend selected by a validated configuration.
#[derive(Debug, Clone)]
pub enum BackendSettings {
    /// In-process memory backend.
    Memory,
    /// S3-compatible object store.
    S3 {
        /// Object locator.
        locator: BackendLocator,
        /// Signing region.
        region: String,
        /// Signing credentials.
        credentials: Credentials,
        /// Optional per-request timeout.
        timeout: Option<Duration>,
    },
}

/// Configuration checked for completeness, built once at startup.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    /// Address for the gateway HTTP API.
    pub listen_addr: String,
    /// Path segment the chunk resource is mounted under.
    pub prefix: String,
    /// Accepted chunk sizes.
    pub limits: ChunkLimits,
    /// Backend to serve from.
    pub backend: BackendSettings,
}

impl CliConfig {
    /// Load config from a TOML file, or use defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Check the configuration and freeze it.
    ///
    /// With `memory`, the backend and credential sections are ignored.
    pub fn validate(&self, memory: bool) -> Result<ValidatedConfig, ConfigError> {
        let limits = ChunkLimits::new(self.chunks.min_size, self.chunks.max_size).ok_or(
            ConfigError::InvalidChunkSizes {
                min: self.chunks.min_size,
                max: self.chunks.max_size,
            },
        )?;

        if !chunkgate_gateway::is_valid_prefix(&self.server.prefix) {
            return Err(ConfigError::InvalidPrefix(self.server.prefix.clone()));
        }

        let backend = if memory {
            BackendSettings::Memory
        } else {
            self.validate_backend()?
        };

        Ok(ValidatedConfig {
            listen_addr: self.server.listen_addr.clone(),
            prefix: self.server.prefix.clone(),
            limits,
            backend,
        })
    }

    fn validate_backend(&self) -> Result<BackendSettings, ConfigError> {
        let b = &self.backend;

        let bucket = non_empty(&b.bucket).ok_or(ConfigError::MissingBucket)?;
        let region = non_empty(&b.region).ok_or(ConfigError::MissingRegion)?;
        if !matches!(b.scheme.as_str(), "http" | "https") {
            return Err(ConfigError::InvalidScheme(b.scheme.clone()));
        }

        let host = non_empty(&b.host)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("s3-{region}.amazonaws.com"));

        let c = &self.credentials;
        let access_key_id =
            non_empty(&c.access_key_id).ok_or(ConfigError::MissingCredential("access_key_id"))?;
        let secret_access_key = non_empty(&c.secret_access_key)
            .ok_or(ConfigError::MissingCredential("secret_access_key"))?;

        let mut credentials = Credentials::new(access_key_id, secret_access_key);
        if let Some(token) = non_empty(&c.session_token) {
            credentials = credentials.with_session_token(token);
        }

        Ok(BackendSettings::S3 {
            locator: BackendLocator::new(host, bucket).with_scheme(b.scheme.clone()),
            region: region.to_owned(),
            credentials,
            timeout: b.timeout_secs.map(Duration::from_secs),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
