//! Concurrent chunk-and-upload pipeline.
//!
//! Three stages connected by bounded channels:
//!
//! 1. A producer on a blocking thread pulls chunks from the [`Chunker`] in
//!    stream order. For each chunk it creates a single-use completion channel,
//!    queues the chunk for the workers and queues the completion receiver for
//!    the consumer.
//! 2. `concurrency` workers each upload one chunk at a time, so no more than
//!    `concurrency` uploads are ever in flight.
//! 3. The consumer awaits completions in production order and stops at the
//!    first failure. Uploads already started are left to finish; their
//!    results are dropped.

use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chunkgate_cas::{Chunk, Chunker, ChunkerConfig, DEFAULT_POLYNOMIAL, Pol};
use chunkgate_types::ChunkKey;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::client::ChunkSink;
use crate::error::UploadError;

/// Number of concurrent uploads when none is configured.
const DEFAULT_CONCURRENCY: usize = 16;

/// Pipeline parameters.
#[derive(Debug, Clone, Copy)]
pub struct UploadOptions {
    /// Maximum number of uploads in flight.
    pub concurrency: usize,
    /// Polynomial driving chunk boundaries.
    pub polynomial: Pol,
    /// Chunk size parameters.
    pub chunker: ChunkerConfig,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            polynomial: DEFAULT_POLYNOMIAL,
            chunker: ChunkerConfig::default(),
        }
    }
}

/// One chunk that was accepted by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadedChunk {
    /// Key of the chunk.
    pub key: ChunkKey,
    /// Offset of the chunk within the source stream.
    pub offset: u64,
    /// Length of the chunk in bytes.
    pub len: usize,
}

/// Outcome of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadReport {
    /// Every chunk, in stream order.
    pub chunks: Vec<UploadedChunk>,
    /// Sum of all chunk lengths.
    pub total_bytes: u64,
    /// Wall-clock time from start to the last completion.
    pub elapsed: Duration,
}

type UploadResult = Result<UploadedChunk, UploadError>;

/// A chunk waiting for a worker, with the channel its result goes to.
struct UploadItem {
    seq: u64,
    chunk: Chunk,
    key: ChunkKey,
    done: oneshot::Sender<UploadResult>,
}

/// Splits streams into chunks and uploads them concurrently.
pub struct UploadPipeline {
    sink: Arc<dyn ChunkSink>,
    chunker: Chunker,
    concurrency: usize,
}

impl UploadPipeline {
    /// Create a pipeline uploading to `sink`.
    ///
    /// Fails if the polynomial or chunker configuration is invalid, or if
    /// `concurrency` is zero.
    pub fn new(sink: Arc<dyn ChunkSink>, options: UploadOptions) -> Result<Self, UploadError> {
        if options.concurrency == 0 {
            return Err(UploadError::InvalidConcurrency);
        }
        let chunker = Chunker::with_config(options.polynomial, options.chunker)?;

        Ok(Self {
            sink,
            chunker,
            concurrency: options.concurrency,
        })
    }

    /// Chunk `source` and upload every chunk.
    ///
    /// Returns the first error in stream order, whether it came from reading
    /// the source or from an upload.
    pub async fn run<R>(&self, source: R) -> Result<UploadReport, UploadError>
    where
        R: Read + Send + 'static,
    {
        let started = Instant::now();
        let n = self.concurrency;

        let (work_tx, work_rx) = mpsc::channel::<UploadItem>(n);
        let (done_tx, mut done_rx) = mpsc::channel::<oneshot::Receiver<UploadResult>>(n);

        let work_rx = Arc::new(Mutex::new(work_rx));
        for _ in 0..n {
            tokio::spawn(worker(Arc::clone(&self.sink), Arc::clone(&work_rx)));
        }

        let chunker = self.chunker.clone();
        let producer = tokio::task::spawn_blocking(move || {
            produce(&chunker, source, &work_tx, &done_tx);
        });

        let mut chunks = Vec::new();
        let mut total_bytes = 0u64;

        while let Some(done) = done_rx.recv().await {
            let uploaded = match done.await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(UploadError::Aborted(
                        "upload finished without a result".into(),
                    ));
                }
            };
            total_bytes += uploaded.len as u64;
            chunks.push(uploaded);
        }

        producer
            .await
            .map_err(|e| UploadError::Aborted(format!("chunk producer failed: {e}")))?;

        let elapsed = started.elapsed();
        info!(
            chunks = chunks.len(),
            total_bytes,
            elapsed_ms = elapsed.as_millis() as u64,
            concurrency = n,
            "upload complete"
        );

        Ok(UploadReport {
            chunks,
            total_bytes,
            elapsed,
        })
    }
}

/// Feed chunks to the workers and completion receivers to the consumer.
///
/// Runs on a blocking thread. Returns early once the consumer has gone away.
fn produce<R: Read>(
    chunker: &Chunker,
    source: R,
    work_tx: &mpsc::Sender<UploadItem>,
    done_tx: &mpsc::Sender<oneshot::Receiver<UploadResult>>,
) {
    for (seq, next) in (0u64..).zip(chunker.chunk(source)) {
        let (tx, rx) = oneshot::channel();

        match next {
            Ok(chunk) => {
                let key = chunk.key();
                let item = UploadItem {
                    seq,
                    chunk,
                    key,
                    done: tx,
                };
                if work_tx.blocking_send(item).is_err() {
                    return;
                }
            }
            Err(e) => {
                // Delivered in order, after every chunk read before it.
                let _ = tx.send(Err(e.into()));
            }
        }

        if done_tx.blocking_send(rx).is_err() {
            debug!(seq, "consumer stopped; ending chunk production");
            return;
        }
    }
}

/// Upload queued chunks one at a time until the queue closes.
async fn worker(sink: Arc<dyn ChunkSink>, queue: Arc<Mutex<mpsc::Receiver<UploadItem>>>) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(item) = next else {
            break;
        };

        let result = upload_one(sink.as_ref(), &item).await;
        if let Err(e) = &result {
            warn!(seq = item.seq, offset = item.chunk.offset, error = %e, "chunk upload failed");
        }
        // The consumer may already have stopped.
        let _ = item.done.send(result);
    }
}

async fn upload_one(sink: &dyn ChunkSink, item: &UploadItem) -> UploadResult {
    let actual = sink.put(item.chunk.data.clone()).await?;
    if actual != item.key {
        return Err(UploadError::KeyMismatch {
            expected: item.key,
            actual,
        });
    }

    Ok(UploadedChunk {
        key: item.key,
        offset: item.chunk.offset,
        len: item.chunk.len(),
    })
}
