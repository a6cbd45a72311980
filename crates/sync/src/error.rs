//! Sync error types.

use crate::transport::TransportError;

/// Errors produced during synchronization.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The transport rejected or failed an upload. Passed through unchanged.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("cancelled")]
    Cancelled,

    #[error("worker failed: {0}")]
    Worker(String),
}
