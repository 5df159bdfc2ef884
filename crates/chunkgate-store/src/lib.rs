//! Backend object-store access for chunkgate.
//!
//! This crate defines the [`ChunkBackend`] trait used by the gateway to probe,
//! read and write chunks, along with two concrete backends:
//!
//! - [`S3Backend`]: an S3-compatible object store reached over HTTP, with
//!   every request signed by a [`RequestSigner`] (see [`SigV4Signer`]).
//! - [`MemoryBackend`]: in-memory storage backed by a `RwLock<HashMap>`,
//!   with operation counters and fault injection for tests.

mod backend;
mod error;
mod memory;
mod s3;
mod signer;

pub use backend::ChunkBackend;
pub use error::StoreError;
pub use memory::{MemoryBackend, OpCounts};
pub use s3::{BackendLocator, S3Backend};
pub use signer::{Credentials, RequestSigner, SigV4Signer};
