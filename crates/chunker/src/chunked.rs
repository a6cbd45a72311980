use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::{Chunk, ChunkData, artifact_path, chunk_id};
use crate::{ChunkError, check_chunk_size};

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, ChunkError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Reads until `buf` is full or the reader hits EOF. Returns bytes read.
pub(crate) fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads a file front to back in fixed-size chunks.
pub struct ChunkReader {
    file: File,
    chunk_size: usize,
    index: usize,
    offset: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    pub fn new(path: &Path, chunk_size: usize) -> Result<Self, ChunkError> {
        check_chunk_size(chunk_size)?;
        let file = File::open(path)?;
        Ok(Self {
            file,
            chunk_size,
            index: 0,
            offset: 0,
        })
    }

    /// Reads the next chunk. Returns `None` once a read yields zero bytes.
    ///
    /// Only the final chunk may be shorter than the chunk size.
    pub fn next_chunk(&mut self) -> Result<Option<ChunkData>, ChunkError> {
        let mut buf = vec![0u8; self.chunk_size];
        let n = read_full(&mut self.file, &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);

        let chunk = ChunkData {
            index: self.index,
            offset: self.offset,
            data: buf,
        };
        self.index += 1;
        self.offset += n as u64;
        Ok(Some(chunk))
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Index of the next chunk to be read.
    pub fn index(&self) -> usize {
        self.index
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Hashes `data`, writes it to its artifact location and returns the chunk record.
pub fn persist_chunk(source: &Path, data: &ChunkData) -> Result<Chunk, ChunkError> {
    let checksum = checksum_bytes(&data.data);
    let artifact = artifact_path(source, data.index);

    let mut file = File::create(&artifact)?;
    file.write_all(&data.data)?;
    file.flush()?;

    debug!(
        index = data.index,
        len = data.data.len(),
        path = %artifact.display(),
        "chunk persisted"
    );

    Ok(Chunk {
        id: chunk_id(source, data.index),
        index: data.index,
        offset: data.offset,
        len: data.data.len(),
        checksum,
        artifact,
    })
}

/// Re-hashes a persisted artifact and compares it with the recorded checksum.
pub fn verify_artifact(chunk: &Chunk) -> Result<(), ChunkError> {
    let data = std::fs::read(&chunk.artifact)?;
    if data.len() != chunk.len || checksum_bytes(&data) != chunk.checksum {
        return Err(ChunkError::ChecksumMismatch { index: chunk.index });
    }
    Ok(())
}

/// Concatenates chunk artifacts in index order into `dest`.
///
/// `chunks` may be in any order but must cover indices `0..n` without gaps.
/// Every artifact is verified before it is written. Returns bytes written.
pub fn reassemble(chunks: &[Chunk], dest: &Path) -> Result<u64, ChunkError> {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.index);

    let mut out = File::create(dest)?;
    let mut written: u64 = 0;

    for (expected, chunk) in ordered.into_iter().enumerate() {
        if chunk.index != expected {
            return Err(ChunkError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("missing chunk {expected}"),
            )));
        }

        let data = std::fs::read(&chunk.artifact)?;
        if checksum_bytes(&data) != chunk.checksum {
            return Err(ChunkError::ChecksumMismatch { index: chunk.index });
        }
        out.write_all(&data)?;
        written += data.len() as u64;
    }

    out.flush()?;
    Ok(written)
}

// ---------------------------------------------------------------------------
// Sequential chunking
// ---------------------------------------------------------------------------

/// Splits `source` into chunks with a single reader, persisting each artifact.
///
/// The result is in index order. An empty source yields an empty list.
pub fn chunk_file(source: &Path, chunk_size: usize) -> Result<Vec<Chunk>, ChunkError> {
    chunk_file_cancellable(source, chunk_size, &CancellationToken::new())
}

/// Like [`chunk_file`], but checks `cancel` before every chunk and returns
/// [`ChunkError::Cancelled`] once it fires. Artifacts already written stay.
pub fn chunk_file_cancellable(
    source: &Path,
    chunk_size: usize,
    cancel: &CancellationToken,
) -> Result<Vec<Chunk>, ChunkError> {
    let mut reader = ChunkReader::new(source, chunk_size)?;
    let mut chunks = Vec::new();

    loop {
        if cancel.is_cancelled() {
            debug!(
                source = %source.display(),
                index = reader.index(),
                "sequential chunking cancelled"
            );
            return Err(ChunkError::Cancelled);
        }
        let Some(data) = reader.next_chunk()? else {
            break;
        };
        chunks.push(persist_chunk(source, &data)?);
    }

    debug!(
        source = %source.display(),
        chunks = chunks.len(),
        bytes = reader.offset(),
        "sequential chunking complete"
    );
    Ok(chunks)
}
