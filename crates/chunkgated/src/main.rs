//! `chunkgated`: the chunkgate daemon.
//!
//! Runs the content-addressed chunk gateway, and doubles as a client for
//! uploading files through a gateway and fetching chunks back.
//!
//! # Usage
//!
//! ```text
//! chunkgated serve                                  # gateway over S3
//! chunkgated serve -c chunkgate.toml               # with a config file
//! chunkgated serve --memory -l 127.0.0.1:8080      # in-memory backend
//! chunkgated upload big.iso -e http://127.0.0.1:8080/objects -j 64
//! chunkgated fetch <key> -e http://127.0.0.1:8080/objects -o chunk.bin
//! ```

mod config;
mod telemetry;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chunkgate_cas::{ChunkerConfig, Pol};
use chunkgate_gateway::{GatewayServer, GatewayServerConfig};
use chunkgate_store::{ChunkBackend, MemoryBackend, S3Backend, SigV4Signer};
use chunkgate_types::ChunkKey;
use chunkgate_upload::{ChunkClient, UploadOptions, UploadPipeline};
use clap::{Parser, Subcommand};
use tracing::info;

use config::{BackendSettings, CliConfig};

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "chunkgated",
    version,
    about = "Content-addressed chunk gateway"
)]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway.
    Serve {
        /// Override listen address (e.g. "127.0.0.1:8080").
        #[arg(short = 'l', long)]
        listen_addr: Option<String>,

        /// Override the route prefix.
        #[arg(long)]
        prefix: Option<String>,

        /// Backend region.
        #[arg(long, env = "AWS_REGION")]
        region: Option<String>,

        /// Backend host (defaults to `s3-{region}.amazonaws.com`).
        #[arg(long)]
        host: Option<String>,

        /// Backend bucket.
        #[arg(long, env = "S3_BUCKET")]
        bucket: Option<String>,

        /// Access key id for request signing.
        #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
        access_key_id: Option<String>,

        /// Secret access key for request signing.
        #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
        secret_access_key: Option<String>,

        /// Session token for temporary credentials.
        #[arg(long, env = "AWS_SESSION_TOKEN", hide_env_values = true)]
        session_token: Option<String>,

        /// Serve from memory instead of a backend store.
        #[arg(short, long)]
        memory: bool,
    },

    /// Chunk a file and upload every chunk through a gateway.
    Upload {
        /// File to upload.
        file: PathBuf,

        /// Gateway resource URL (e.g. "http://127.0.0.1:8080/objects").
        #[arg(short, long)]
        endpoint: String,

        /// Maximum concurrent uploads.
        #[arg(short = 'j', long, default_value = "16")]
        concurrency: usize,

        /// Chunking polynomial, in hex.
        #[arg(short, long, default_value = "0x3DA3358B4DC173")]
        polynomial: String,

        /// Smallest chunk to cut (defaults to `[chunks] min_size`).
        #[arg(long)]
        min_size: Option<usize>,

        /// Largest chunk to cut (defaults to `[chunks] max_size`).
        #[arg(long)]
        max_size: Option<usize>,

        /// Boundary mask width; chunks average `2^bits` bytes past the minimum.
        #[arg(long)]
        average_bits: Option<u32>,
    },

    /// Fetch one chunk from a gateway.
    Fetch {
        /// Encoded chunk key.
        key: String,

        /// Gateway resource URL (e.g. "http://127.0.0.1:8080/objects").
        #[arg(short, long)]
        endpoint: String,

        /// Write the chunk here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    telemetry::init(&config.log.level);

    match cli.command {
        Commands::Serve {
            listen_addr,
            prefix,
            region,
            host,
            bucket,
            access_key_id,
            secret_access_key,
            session_token,
            memory,
        } => {
            // CLI args (and their env fallbacks) override config file values.
            if let Some(addr) = listen_addr {
                config.server.listen_addr = addr;
            }
            if let Some(p) = prefix {
                config.server.prefix = p;
            }
            if region.is_some() {
                config.backend.region = region;
            }
            if host.is_some() {
                config.backend.host = host;
            }
            if bucket.is_some() {
                config.backend.bucket = bucket;
            }
            if access_key_id.is_some() {
                config.credentials.access_key_id = access_key_id;
            }
            if secret_access_key.is_some() {
                config.credentials.secret_access_key = secret_access_key;
            }
            if session_token.is_some() {
                config.credentials.session_token = session_token;
            }
            cmd_serve(config, memory).await
        }
        Commands::Upload {
            file,
            endpoint,
            concurrency,
            polynomial,
            min_size,
            max_size,
            average_bits,
        } => {
            let chunker = upload_chunker_config(&config, min_size, max_size, average_bits);
            cmd_upload(file, &endpoint, concurrency, &polynomial, chunker).await
        }
        Commands::Fetch {
            key,
            endpoint,
            output,
        } => cmd_fetch(&key, &endpoint, output).await,
    }
}

// -----------------------------------------------------------------------
// chunkgated serve
// -----------------------------------------------------------------------

/// Build the backend selected by the configuration.
fn build_backend(settings: &BackendSettings) -> Result<Arc<dyn ChunkBackend>> {
    match settings {
        BackendSettings::Memory => {
            info!("using in-memory backend");
            Ok(Arc::new(MemoryBackend::new()))
        }
        BackendSettings::S3 {
            locator,
            region,
            credentials,
            timeout,
        } => {
            info!(
                host = locator.host(),
                bucket = locator.bucket(),
                region = %region,
                "using S3 backend"
            );
            let signer = SigV4Signer::new(credentials.clone(), region.clone());
            let backend = S3Backend::new(locator.clone(), Arc::new(signer), *timeout)
                .context("failed to create backend client")?;
            Ok(Arc::new(backend))
        }
    }
}

async fn cmd_serve(config: CliConfig, memory: bool) -> Result<()> {
    let config = config.validate(memory).context("invalid configuration")?;
    let backend = build_backend(&config.backend)?;

    let server = GatewayServer::new(GatewayServerConfig {
        backend,
        limits: config.limits,
        prefix: config.prefix.clone(),
    })?;

    info!(
        addr = %config.listen_addr,
        prefix = %config.prefix,
        min_size = config.limits.min_size,
        max_size = config.limits.max_size,
        "gateway ready"
    );

    server
        .serve_with_shutdown(&config.listen_addr, shutdown_signal())
        .await
        .context("gateway server failed")?;

    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

// -----------------------------------------------------------------------
// chunkgated upload
// -----------------------------------------------------------------------

/// Chunker sizes for an upload.
///
/// Unset flags fall back to the `[chunks]` limits, so an upload cuts chunks
/// a gateway with the same configuration accepts. Only the final chunk of a
/// source can be shorter than `min_size`.
fn upload_chunker_config(
    config: &CliConfig,
    min_size: Option<usize>,
    max_size: Option<usize>,
    average_bits: Option<u32>,
) -> ChunkerConfig {
    ChunkerConfig {
        min_size: min_size.unwrap_or(config.chunks.min_size as usize),
        max_size: max_size.unwrap_or(config.chunks.max_size as usize),
        average_bits: average_bits.unwrap_or(ChunkerConfig::default().average_bits),
    }
}

async fn cmd_upload(
    file: PathBuf,
    endpoint: &str,
    concurrency: usize,
    polynomial: &str,
    chunker: ChunkerConfig,
) -> Result<()> {
    let polynomial: Pol = polynomial
        .parse()
        .with_context(|| format!("invalid polynomial {polynomial:?}"))?;
    let source = std::fs::File::open(&file)
        .with_context(|| format!("failed to open {}", file.display()))?;

    let client = ChunkClient::new(endpoint)?;
    let pipeline = UploadPipeline::new(
        Arc::new(client),
        UploadOptions {
            concurrency,
            polynomial,
            chunker,
        },
    )?;

    let report = pipeline
        .run(source)
        .await
        .with_context(|| format!("upload of {} failed", file.display()))?;

    let mut stdout = std::io::stdout().lock();
    for chunk in &report.chunks {
        writeln!(stdout, "{}\t{}\t{}", chunk.offset, chunk.len, chunk.key)?;
    }

    let secs = report.elapsed.as_secs_f64();
    let mbs = if secs > 0.0 {
        report.total_bytes as f64 / (1024.0 * 1024.0) / secs
    } else {
        0.0
    };
    eprintln!(
        "uploaded {} chunks, {} bytes in {secs:.2}s ({mbs:.1} MB/s)",
        report.chunks.len(),
        report.total_bytes,
    );
    Ok(())
}

// -----------------------------------------------------------------------
// chunkgated fetch
// -----------------------------------------------------------------------

async fn cmd_fetch(key: &str, endpoint: &str, output: Option<PathBuf>) -> Result<()> {
    let key = ChunkKey::decode(key).with_context(|| format!("invalid key {key:?}"))?;
    let client = ChunkClient::new(endpoint)?;

    let Some(data) = client.get(&key).await? else {
        bail!("chunk {key} not found");
    };

    match output {
        Some(path) => std::fs::write(&path, &data)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => std::io::stdout().lock().write_all(&data)?,
    }
    Ok(())
}
