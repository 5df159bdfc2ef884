//! Client side of chunkgate.
//!
//! - [`ChunkClient`]: HTTP client for a gateway's ingest and fetch routes.
//! - [`UploadPipeline`]: splits a byte stream into content-defined chunks and
//!   uploads them through a [`ChunkSink`] with a fixed number of workers.
//!   Results are consumed in the order chunks were produced, and the first
//!   failure in that order ends the upload.

mod client;
mod error;
mod pipeline;

pub use client::{ChunkClient, ChunkSink};
pub use error::UploadError;
pub use pipeline::{UploadOptions, UploadPipeline, UploadReport, UploadedChunk};
