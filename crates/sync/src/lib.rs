//! Chunk synchronization engine.
//!
//! Given a fresh chunk list and a baseline, the engine uploads every chunk
//! whose identifier is missing from the baseline or recorded with a different
//! hash, and records each successful upload.
//!
//! # Pipeline
//!
//! 1. **Queue** — every chunk goes on a shared work queue
//! 2. **Lock** — a worker takes the per-identifier lock for its chunk
//! 3. **Decide** — compare the chunk hash with the baseline record
//! 4. **Upload** — dirty chunks go through the [`Transport`]
//! 5. **Record** — the baseline entry is replaced after a successful upload
//!
//! The delivery mechanism is left to the caller through the [`Transport`]
//! trait.

pub mod engine;
pub mod error;
pub mod locks;
pub mod transport;
pub mod types;

pub use engine::SyncEngine;
pub use error::SyncError;
pub use locks::KeyLocks;
pub use transport::{Transport, TransportError};
pub use types::{DEFAULT_WORKERS, SyncConfig, SyncEvent, SyncReport};
