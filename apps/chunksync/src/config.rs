//! Run configuration, stored as TOML.
//!
//! ```toml
//! source = "data/archive.bin"
//! endpoint = "http://localhost:8080/upload"
//! # optional
//! baseline = "state/archive.baseline.json"
//! chunk_size = 4194304
//! workers = 4
//! parallel = true
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use chunksync_chunker::{ChunkerConfig, DEFAULT_CHUNK_SIZE};
use chunksync_sync::{DEFAULT_WORKERS, SyncConfig};
use serde::{Deserialize, Serialize};

/// chunksync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// File to chunk and synchronize.
    pub source: PathBuf,

    /// URL every dirty chunk is POSTed to.
    pub endpoint: String,

    /// Baseline file. Defaults to `<source>.baseline.json`.
    #[serde(default)]
    pub baseline: Option<PathBuf>,

    /// Chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Worker count for both chunking and uploading.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Chunk with a worker pool instead of a single sequential pass.
    #[serde(default = "default_true")]
    pub parallel: bool,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Reads and validates the configuration at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing configuration {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(self.workers > 0, "workers must be positive");
        anyhow::ensure!(!self.endpoint.is_empty(), "endpoint must not be empty");
        Ok(())
    }

    /// Baseline location, falling back to a sibling of the source.
    pub fn baseline_path(&self) -> PathBuf {
        self.baseline.clone().unwrap_or_else(|| {
            let mut name = self.source.clone().into_os_string();
            name.push(".baseline.json");
            PathBuf::from(name)
        })
    }

    pub fn chunker(&self) -> ChunkerConfig {
        ChunkerConfig {
            chunk_size: self.chunk_size,
            workers: self.workers,
        }
    }

    pub fn sync(&self) -> SyncConfig {
        SyncConfig {
            workers: self.workers,
        }
    }
}
