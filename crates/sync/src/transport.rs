//! Transport trait.
//!
//! `Transport` is implemented by whatever actually delivers chunk bytes to
//! the remote store. Keeping it a trait leaves the engine testable with mocks.

use std::future::Future;
use std::pin::Pin;

use chunksync_chunker::Chunk;

/// Errors reported by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote end answered but did not accept the chunk.
    #[error("upload rejected: {0}")]
    Rejected(String),

    /// The remote end could not be reached.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Delivers one chunk to the remote store.
pub trait Transport: Send + Sync {
    /// Uploads the bytes of `chunk`'s artifact.
    ///
    /// `Ok(())` means the remote end acknowledged the chunk and the baseline
    /// may be updated. Any error aborts the current sync batch.
    fn upload<'a>(
        &'a self,
        chunk: &'a Chunk,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;
}
