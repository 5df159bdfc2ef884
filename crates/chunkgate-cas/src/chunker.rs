//! Rabin content-defined chunker.
//!
//! A 64-byte window slides over the input while a Rabin fingerprint of the
//! window is maintained in O(1) per byte. A boundary is declared when the low
//! `average_bits` bits of the fingerprint are all zero, subject to the
//! configured minimum and maximum chunk sizes. The window is cleared at every
//! boundary, so the next chunk's boundary depends only on its own content.

use std::io::{ErrorKind, Read};
use std::sync::Arc;

use bytes::Bytes;
use chunkgate_types::ChunkKey;

use crate::error::CasError;
use crate::polynomial::Pol;

/// Width of the rolling-hash window in bytes.
pub const WINDOW_SIZE: usize = 64;

/// Size of the scratch buffer used to read from the source.
const READ_BUF_SIZE: usize = 512 * 1024;

/// Default minimum chunk size (512 KiB).
const DEFAULT_MIN_SIZE: usize = 512 * 1024;

/// Default maximum chunk size (8 MiB).
const DEFAULT_MAX_SIZE: usize = 8 * 1024 * 1024;

/// Default boundary mask width: one boundary per ~1 MiB of hashed input.
const DEFAULT_AVERAGE_BITS: u32 = 20;

/// A single chunk cut from the input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset of this chunk within the source stream.
    pub offset: u64,
    /// The chunk bytes. Owned; never aliases the chunker's scratch buffer.
    pub data: Bytes,
}

impl Chunk {
    /// Length of the chunk in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the chunk is empty (never true for chunks yielded by [`ChunkIter`]).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Content-addressed key of this chunk.
    pub fn key(&self) -> ChunkKey {
        ChunkKey::from_data(&self.data)
    }
}

/// Size parameters for the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// No boundary is placed before this many bytes (except at end of stream).
    pub min_size: usize,
    /// A boundary is forced once a chunk reaches this many bytes.
    pub max_size: usize,
    /// Number of low fingerprint bits that must be zero for a boundary.
    ///
    /// The expected distance between boundaries past `min_size` is
    /// `2^average_bits` bytes.
    pub average_bits: u32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_MIN_SIZE,
            max_size: DEFAULT_MAX_SIZE,
            average_bits: DEFAULT_AVERAGE_BITS,
        }
    }
}

impl ChunkerConfig {
    fn validate(&self) -> Result<(), CasError> {
        if self.min_size == 0 {
            return Err(CasError::InvalidConfig("min_size must be > 0".into()));
        }
        if self.max_size < self.min_size {
            return Err(CasError::InvalidConfig(format!(
                "max_size {} is smaller than min_size {}",
                self.max_size, self.min_size
            )));
        }
        if !(1..=40).contains(&self.average_bits) {
            return Err(CasError::InvalidConfig(format!(
                "average_bits {} must be between 1 and 40",
                self.average_bits
            )));
        }
        Ok(())
    }

    fn split_mask(&self) -> u64 {
        (1u64 << self.average_bits) - 1
    }
}

/// Lookup tables derived from the polynomial.
struct Tables {
    /// `out[b]` = fingerprint of `b` followed by `WINDOW_SIZE - 1` zero bytes.
    /// XOR-ing it removes `b` from a full window.
    out: [u64; 256],
    /// `modulo[b]` = `(b * x^k mod pol) | (b * x^k)`, where `k = deg(pol)`.
    /// XOR-ing it both clears the 8 bits shifted above the degree and adds
    /// their remainder.
    modulo: [u64; 256],
}

impl Tables {
    fn new(pol: Pol) -> Self {
        let mut out = [0u64; 256];
        let mut modulo = [0u64; 256];
        let k = pol.deg() as u32;

        for b in 0..256u64 {
            let mut h = append_byte(Pol::new(0), b as u8, pol);
            for _ in 0..WINDOW_SIZE - 1 {
                h = append_byte(h, 0, pol);
            }
            out[b as usize] = h.bits();

            modulo[b as usize] = Pol::new(b << k).modulo(pol).bits() | (b << k);
        }

        Self { out, modulo }
    }
}

fn append_byte(hash: Pol, b: u8, pol: Pol) -> Pol {
    Pol::new((hash.bits() << 8) | u64::from(b)).modulo(pol)
}

/// Rolling Rabin fingerprint over the last [`WINDOW_SIZE`] bytes.
struct RollingHash {
    tables: Arc<Tables>,
    pol_shift: u32,
    window: [u8; WINDOW_SIZE],
    wpos: usize,
    digest: u64,
}

impl RollingHash {
    fn new(tables: Arc<Tables>, pol: Pol) -> Self {
        let mut hash = Self {
            tables,
            pol_shift: pol.deg() as u32 - 8,
            window: [0; WINDOW_SIZE],
            wpos: 0,
            digest: 0,
        };
        hash.reset();
        hash
    }

    fn reset(&mut self) {
        self.window = [0; WINDOW_SIZE];
        self.wpos = 0;
        self.digest = 0;
        self.slide(1);
    }

    #[inline]
    fn slide(&mut self, b: u8) {
        let out = self.window[self.wpos];
        self.window[self.wpos] = b;
        self.digest ^= self.tables.out[out as usize];
        self.wpos = (self.wpos + 1) % WINDOW_SIZE;

        let index = (self.digest >> self.pol_shift) as u8;
        self.digest <<= 8;
        self.digest |= u64::from(b);
        self.digest ^= self.tables.modulo[index as usize];
    }
}

/// Content-defined chunker.
///
/// Holds the validated polynomial, its lookup tables, and the size
/// configuration. Cheap to clone; tables are shared.
#[derive(Clone)]
pub struct Chunker {
    pol: Pol,
    tables: Arc<Tables>,
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a chunker with the default size configuration.
    pub fn new(pol: Pol) -> Result<Self, CasError> {
        Self::with_config(pol, ChunkerConfig::default())
    }

    /// Create a chunker with custom size parameters.
    pub fn with_config(pol: Pol, config: ChunkerConfig) -> Result<Self, CasError> {
        pol.validate()?;
        config.validate()?;

        Ok(Self {
            pol,
            tables: Arc::new(Tables::new(pol)),
            config,
        })
    }

    /// The polynomial driving this chunker.
    pub fn polynomial(&self) -> Pol {
        self.pol
    }

    /// The size configuration.
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Lazily split `reader` into chunks.
    pub fn chunk<R: Read>(&self, reader: R) -> ChunkIter<R> {
        ChunkIter {
            reader,
            hash: RollingHash::new(Arc::clone(&self.tables), self.pol),
            config: self.config,
            split_mask: self.config.split_mask(),
            buf: vec![0u8; READ_BUF_SIZE],
            bpos: 0,
            bmax: 0,
            pos: 0,
            done: false,
        }
    }

    /// Split an in-memory buffer into chunks.
    pub fn chunk_bytes(&self, data: &[u8]) -> Vec<Chunk> {
        // Reading from a slice cannot fail.
        self.chunk(data).filter_map(Result::ok).collect()
    }
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("pol", &self.pol)
            .field("config", &self.config)
            .finish()
    }
}

/// Iterator over the chunks of a [`Read`] source.
///
/// Yields `Ok(chunk)` in stream order, then `None` at end of stream. A read
/// error is yielded once as `Err` and ends the iteration.
pub struct ChunkIter<R> {
    reader: R,
    hash: RollingHash,
    config: ChunkerConfig,
    split_mask: u64,
    buf: Vec<u8>,
    bpos: usize,
    bmax: usize,
    /// Stream offset of the next chunk's first byte.
    pos: u64,
    done: bool,
}

impl<R: Read> ChunkIter<R> {
    /// Refill the scratch buffer. Returns `false` at end of stream.
    fn fill(&mut self) -> Result<bool, CasError> {
        loop {
            match self.reader.read(&mut self.buf) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.bpos = 0;
                    self.bmax = n;
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn next_chunk(&mut self) -> Result<Option<Chunk>, CasError> {
        let min = self.config.min_size;
        let max = self.config.max_size;
        // Bytes before this point cannot end a chunk, so they are not hashed.
        let pre = min.saturating_sub(WINDOW_SIZE);

        let mut data: Vec<u8> = Vec::with_capacity(min);
        self.hash.reset();

        loop {
            if self.bpos >= self.bmax && !self.fill()? {
                self.done = true;
                if data.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.emit(data)));
            }

            let avail = &self.buf[self.bpos..self.bmax];

            if data.len() < pre {
                let n = (pre - data.len()).min(avail.len());
                data.extend_from_slice(&avail[..n]);
                self.bpos += n;
                continue;
            }

            let hash = &mut self.hash;
            let mut count = data.len();
            let mut cut = None;

            for (i, &b) in avail.iter().enumerate() {
                hash.slide(b);
                count += 1;

                if count < min {
                    continue;
                }
                if hash.digest & self.split_mask == 0 || count >= max {
                    cut = Some(i + 1);
                    break;
                }
            }

            match cut {
                Some(n) => {
                    data.extend_from_slice(&avail[..n]);
                    self.bpos += n;
                    return Ok(Some(self.emit(data)));
                }
                None => {
                    data.extend_from_slice(avail);
                    self.bpos = self.bmax;
                }
            }
        }
    }

    fn emit(&mut self, data: Vec<u8>) -> Chunk {
        let chunk = Chunk {
            offset: self.pos,
            data: Bytes::from(data),
        };
        self.pos += chunk.len() as u64;
        chunk
    }
}

impl<R: Read> Iterator for ChunkIter<R> {
    type Item = Result<Chunk, CasError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
