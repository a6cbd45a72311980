//! Fixed-size, content-addressed file chunking.
//!
//! A source file is split into `ceil(size / chunk_size)` contiguous byte
//! ranges. Each range is hashed with SHA-256 and persisted next to the
//! source as `<source>.chunk.<index>`.
//!
//! Two strategies produce the same chunks:
//! - [`chunk_file`] reads the source front to back with one handle.
//! - [`chunk_file_parallel`] fans indices out to a worker pool where every
//!   worker owns its own file handle.

mod chunked;
mod parallel;
mod types;

pub use chunked::{
    ChunkReader, calculate_file_checksum, checksum_bytes, chunk_file, chunk_file_cancellable,
    persist_chunk, reassemble, verify_artifact,
};
pub use parallel::chunk_file_parallel;
pub use types::{Chunk, ChunkData, artifact_path, chunk_id};

/// Default chunk size: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Default number of parallel chunking workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Size of every chunk except possibly the last, in bytes. Must be non-zero.
    pub chunk_size: usize,
    /// Worker pool size for [`chunk_file_parallel`]. Zero is treated as one.
    pub workers: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Errors produced by the chunker.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    #[error("checksum mismatch for chunk {index}")]
    ChecksumMismatch { index: usize },

    #[error("source changed while chunking (chunk {index} is empty)")]
    SourceChanged { index: usize },

    #[error("cancelled")]
    Cancelled,

    #[error("worker failed: {0}")]
    Worker(String),
}

pub(crate) fn check_chunk_size(chunk_size: usize) -> Result<(), ChunkError> {
    if chunk_size == 0 {
        return Err(ChunkError::InvalidChunkSize(chunk_size));
    }
    Ok(())
}
