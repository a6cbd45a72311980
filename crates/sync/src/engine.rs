//! Sync engine: a worker pool that uploads dirty chunks.
//!
//! Workers pull chunks from a shared queue. For each chunk a worker takes
//! the identifier's lock, compares the chunk hash with the baseline, uploads
//! through the transport when they differ, and records the new hash. The
//! first failure cancels the batch; completed uploads stay recorded.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chunksync_baseline::{BaselineStore, ChunkRecord};
use chunksync_chunker::Chunk;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SyncError;
use crate::locks::KeyLocks;
use crate::transport::Transport;
use crate::types::{SyncConfig, SyncEvent, SyncReport};

/// Synchronizes chunk lists against a baseline through a transport.
pub struct SyncEngine {
    transport: Arc<dyn Transport>,
    config: SyncConfig,
    locks: Arc<KeyLocks>,
    events_tx: mpsc::Sender<SyncEvent>,
    events_rx: Option<mpsc::Receiver<SyncEvent>>,
    cancel: CancellationToken,
}

impl SyncEngine {
    /// Creates an engine that uploads through `transport`.
    pub fn new(transport: Arc<dyn Transport>, config: SyncConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            transport,
            config,
            locks: Arc::new(KeyLocks::new()),
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    ///
    /// Events are dropped rather than delayed when the receiver lags.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.events_rx.take()
    }

    /// Returns the token that cancels every run of this engine.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Uploads every dirty chunk in `chunks` and records it in `baseline`.
    ///
    /// A chunk is dirty when its identifier is absent from the baseline or
    /// recorded with a different hash. Chunks sharing an identifier are
    /// handled one at a time, so each changed identifier is uploaded at most
    /// once per pass.
    ///
    /// The first transport error cancels the remaining work and is returned
    /// unchanged. Uploads that completed before it remain recorded in
    /// `baseline`, so re-running the same pass only uploads what is left.
    pub async fn synchronize(
        &self,
        chunks: Vec<Chunk>,
        baseline: Arc<dyn BaselineStore>,
    ) -> Result<SyncReport, SyncError> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let stale = stale_identifiers(&chunks, baseline.as_ref());
        if !stale.is_empty() {
            warn!(
                count = stale.len(),
                "baseline holds identifiers with no current chunk"
            );
        }

        let total = chunks.len();
        if total == 0 {
            let _ = self.events_tx.try_send(SyncEvent::Completed {
                uploaded: 0,
                skipped: 0,
            });
            return Ok(SyncReport {
                stale,
                ..SyncReport::default()
            });
        }

        let workers = self.config.workers.clamp(1, total);
        debug!(chunks = total, workers, "sync started");

        let batch = self.cancel.child_token();
        let _stop_on_drop = batch.clone().drop_guard();
        let ctx = Arc::new(WorkerContext {
            transport: Arc::clone(&self.transport),
            baseline,
            locks: Arc::clone(&self.locks),
            queue: Mutex::new(VecDeque::from(chunks)),
            cancel: batch.clone(),
            events_tx: self.events_tx.clone(),
        });

        let mut set = JoinSet::new();
        for _ in 0..workers {
            let ctx = Arc::clone(&ctx);
            set.spawn(async move {
                let result = ctx.run().await;
                if result.is_err() {
                    ctx.cancel.cancel();
                }
                result
            });
        }

        let mut uploaded: Vec<(usize, String)> = Vec::new();
        let mut skipped = 0;
        let mut failure: Option<SyncError> = None;

        while let Some(joined) = set.join_next().await {
            let result = joined.unwrap_or_else(|e| {
                batch.cancel();
                Err(SyncError::Worker(e.to_string()))
            });
            match result {
                Ok(tally) => {
                    uploaded.extend(tally.uploaded);
                    skipped += tally.skipped;
                }
                Err(e) => keep_first_error(&mut failure, e),
            }
        }

        if let Some(e) = failure {
            error!(error = %e, "sync aborted");
            return Err(e);
        }

        uploaded.sort_by_key(|(index, _)| *index);
        let uploaded: Vec<String> = uploaded.into_iter().map(|(_, id)| id).collect();

        let _ = self.events_tx.try_send(SyncEvent::Completed {
            uploaded: uploaded.len(),
            skipped,
        });
        info!(uploaded = uploaded.len(), skipped, "sync completed");

        Ok(SyncReport {
            uploaded,
            skipped,
            stale,
        })
    }
}

/// State shared by the workers of one batch.
struct WorkerContext {
    transport: Arc<dyn Transport>,
    baseline: Arc<dyn BaselineStore>,
    locks: Arc<KeyLocks>,
    queue: Mutex<VecDeque<Chunk>>,
    cancel: CancellationToken,
    events_tx: mpsc::Sender<SyncEvent>,
}

#[derive(Default)]
struct Tally {
    uploaded: Vec<(usize, String)>,
    skipped: usize,
}

impl WorkerContext {
    /// Drains the queue until it is empty, a chunk fails, or the batch is cancelled.
    async fn run(&self) -> Result<Tally, SyncError> {
        let mut tally = Tally::default();

        loop {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let Some(chunk) = self.next_chunk() else {
                return Ok(tally);
            };

            match self.process(&chunk).await {
                Ok(true) => tally.uploaded.push((chunk.index, chunk.id)),
                Ok(false) => tally.skipped += 1,
                Err(e) => {
                    if !matches!(e, SyncError::Cancelled) {
                        let _ = self.events_tx.try_send(SyncEvent::Failed {
                            id: chunk.id.clone(),
                            error: e.to_string(),
                        });
                    }
                    return Err(e);
                }
            }
        }
    }

    fn next_chunk(&self) -> Option<Chunk> {
        self.queue.lock().unwrap().pop_front()
    }

    /// Returns `Ok(true)` if the chunk was uploaded, `Ok(false)` if skipped.
    async fn process(&self, chunk: &Chunk) -> Result<bool, SyncError> {
        let _key = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
            guard = self.locks.lock(&chunk.id) => guard,
        };

        if !self.baseline.is_dirty(chunk) {
            debug!(id = %chunk.id, index = chunk.index, "chunk unchanged");
            let _ = self.events_tx.try_send(SyncEvent::Skipped {
                id: chunk.id.clone(),
                index: chunk.index,
            });
            return Ok(false);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
            result = self.transport.upload(chunk) => result?,
        }

        self.baseline.put(ChunkRecord::from(chunk));
        debug!(id = %chunk.id, index = chunk.index, len = chunk.len, "chunk uploaded");
        let _ = self.events_tx.try_send(SyncEvent::Uploaded {
            id: chunk.id.clone(),
            index: chunk.index,
        });
        Ok(true)
    }
}

/// Baseline identifiers not present in `chunks`.
fn stale_identifiers(chunks: &[Chunk], baseline: &dyn BaselineStore) -> Vec<String> {
    let current: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
    baseline
        .entries()
        .into_keys()
        .filter(|id| !current.contains(id.as_str()))
        .collect()
}

/// Keeps the first real failure; a peer's `Cancelled` never masks it.
fn keep_first_error(slot: &mut Option<SyncError>, err: SyncError) {
    match slot {
        None => *slot = Some(err),
        Some(SyncError::Cancelled) if !matches!(err, SyncError::Cancelled) => *slot = Some(err),
        Some(_) => {}
    }
}
