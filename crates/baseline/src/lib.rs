//! Baseline of last-synchronized chunks.
//!
//! The baseline maps chunk identifiers to the metadata of the chunk that was
//! last uploaded successfully under that identifier. The sync engine reads it
//! to decide which chunks are dirty and writes to it after each upload.

mod file;
mod store;

pub use file::{load, load_or_default, save};
pub use store::{Baseline, BaselineStore, ChunkRecord};

use std::path::PathBuf;

/// Errors from loading or saving a baseline.
#[derive(Debug, thiserror::Error)]
pub enum BaselineError {
    /// No baseline exists at the location (a first run).
    #[error("no baseline at {0}")]
    NotFound(PathBuf),

    #[error("could not read baseline {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The baseline exists but is not a valid ledger.
    #[error("could not parse baseline {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("could not write baseline {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
