//! Data types for the sync flow.

/// Default number of concurrent upload workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Upload worker pool size. Zero is treated as one.
    pub workers: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Progress event emitted during synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A dirty chunk was uploaded and recorded.
    Uploaded { id: String, index: usize },
    /// A chunk matched its baseline record.
    Skipped { id: String, index: usize },
    /// A chunk failed and the batch is aborting.
    Failed { id: String, error: String },
    /// The batch finished without errors.
    Completed { uploaded: usize, skipped: usize },
}

/// Outcome of a successful synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Identifiers uploaded in this pass, in chunk index order.
    pub uploaded: Vec<String>,
    /// Number of chunks whose hash matched the baseline.
    pub skipped: usize,
    /// Baseline identifiers with no chunk in this pass (e.g. the file shrank).
    /// They are left in the baseline for the caller to prune.
    pub stale: Vec<String>,
}
