//! Parallel chunking over a fixed-size worker pool.
//!
//! Every worker opens its own handle onto the source, so read cursors are
//! never shared. Indices are claimed from a shared atomic counter; results
//! come back through the workers' join handles.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::chunked::{persist_chunk, read_full};
use crate::types::{Chunk, ChunkData};
use crate::{ChunkError, ChunkerConfig, check_chunk_size};

/// Splits `source` into chunks using `config.workers` blocking workers.
///
/// Produces the same chunks and artifacts as [`chunk_file`](crate::chunk_file).
/// The returned list is always sorted by index, whatever order the workers
/// finished in.
///
/// The first worker failure cancels the rest; every worker is joined before
/// this returns, so no artifact is written after the call completes.
/// Cancelling `cancel` stops workers before their next chunk and yields
/// [`ChunkError::Cancelled`].
pub async fn chunk_file_parallel(
    source: &Path,
    config: &ChunkerConfig,
    cancel: CancellationToken,
) -> Result<Vec<Chunk>, ChunkError> {
    check_chunk_size(config.chunk_size)?;
    if cancel.is_cancelled() {
        return Err(ChunkError::Cancelled);
    }

    let size = tokio::fs::metadata(source).await?.len();
    let count = size.div_ceil(config.chunk_size as u64) as usize;
    if count == 0 {
        debug!(source = %source.display(), "empty source, nothing to chunk");
        return Ok(Vec::new());
    }

    let workers = config.workers.clamp(1, count);
    debug!(
        source = %source.display(),
        size,
        chunks = count,
        workers,
        "parallel chunking started"
    );

    let batch = cancel.child_token();
    // Stops blocking workers if this future is dropped mid-flight.
    let _stop_on_drop = batch.clone().drop_guard();
    let next = Arc::new(AtomicUsize::new(0));
    let mut set = JoinSet::new();

    for _ in 0..workers {
        let source = source.to_path_buf();
        let next = Arc::clone(&next);
        let batch = batch.clone();
        let chunk_size = config.chunk_size;
        set.spawn_blocking(move || {
            let result = run_worker(&source, chunk_size, count, &next, &batch);
            if result.is_err() {
                batch.cancel();
            }
            result
        });
    }

    let mut chunks = Vec::with_capacity(count);
    let mut failure: Option<ChunkError> = None;

    while let Some(joined) = set.join_next().await {
        let result = joined.unwrap_or_else(|e| {
            batch.cancel();
            Err(ChunkError::Worker(e.to_string()))
        });
        match result {
            Ok(mut produced) => chunks.append(&mut produced),
            Err(e) => keep_first_error(&mut failure, e),
        }
    }

    if let Some(e) = failure {
        warn!(source = %source.display(), error = %e, "parallel chunking aborted");
        return Err(e);
    }

    chunks.sort_by_key(|c| c.index);
    debug!(source = %source.display(), chunks = chunks.len(), "parallel chunking complete");
    Ok(chunks)
}

/// Claims indices until the queue is exhausted, a chunk fails, or the batch
/// is cancelled.
fn run_worker(
    source: &Path,
    chunk_size: usize,
    count: usize,
    next: &AtomicUsize,
    cancel: &CancellationToken,
) -> Result<Vec<Chunk>, ChunkError> {
    let mut file = File::open(source)?;
    let mut buf = vec![0u8; chunk_size];
    let mut produced = Vec::new();

    loop {
        if cancel.is_cancelled() {
            return Err(ChunkError::Cancelled);
        }

        let index = next.fetch_add(1, Ordering::Relaxed);
        if index >= count {
            return Ok(produced);
        }

        let offset = index as u64 * chunk_size as u64;
        file.seek(SeekFrom::Start(offset))?;
        let n = read_full(&mut file, &mut buf)?;
        if n == 0 {
            return Err(ChunkError::SourceChanged { index });
        }

        let data = ChunkData {
            index,
            offset,
            data: buf[..n].to_vec(),
        };
        produced.push(persist_chunk(source, &data)?);
    }
}

/// Keeps the first real failure; a peer's `Cancelled` never masks it.
fn keep_first_error(slot: &mut Option<ChunkError>, err: ChunkError) {
    match slot {
        None => *slot = Some(err),
        Some(ChunkError::Cancelled) if !matches!(err, ChunkError::Cancelled) => *slot = Some(err),
        Some(_) => {}
    }
}
