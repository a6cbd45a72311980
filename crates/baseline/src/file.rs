//! JSON persistence for the baseline.
//!
//! The file holds one object mapping identifier to record:
//!
//! ```json
//! { "data.bin.chunk.0": { "identifier": "data.bin.chunk.0", "contentHash": "9f86…", "index": 0 } }
//! ```
//!
//! Saves go to a uniquely named sibling file which is fsynced and then
//! renamed over the target, so readers see either the old or the new ledger.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::Error as _;
use tracing::{debug, info};

use crate::BaselineError;
use crate::store::{Baseline, BaselineStore, ChunkRecord};

/// Loads a baseline from `path`.
///
/// A missing file is reported as [`BaselineError::NotFound`], distinct from
/// an unreadable ([`BaselineError::Read`]) or corrupt
/// ([`BaselineError::Parse`]) one.
pub fn load(path: &Path) -> Result<Baseline, BaselineError> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BaselineError::NotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(BaselineError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let parse_err = |source| BaselineError::Parse {
        path: path.to_path_buf(),
        source,
    };

    let records: HashMap<String, ChunkRecord> = serde_json::from_slice(&data).map_err(parse_err)?;
    if let Some((key, record)) = records.iter().find(|(k, r)| **k != r.identifier) {
        return Err(parse_err(serde_json::Error::custom(format!(
            "key {key} holds record for {}",
            record.identifier
        ))));
    }

    debug!(path = %path.display(), records = records.len(), "baseline loaded");
    Ok(Baseline::from_records(records))
}

/// Loads a baseline, treating a missing file as an empty baseline.
///
/// Read and parse failures are still errors.
pub fn load_or_default(path: &Path) -> Result<Baseline, BaselineError> {
    match load(path) {
        Err(BaselineError::NotFound(_)) => {
            info!(path = %path.display(), "no baseline found, starting from empty");
            Ok(Baseline::new())
        }
        other => other,
    }
}

/// Atomically writes every record in `store` to `path`.
pub fn save(path: &Path, store: &dyn BaselineStore) -> Result<(), BaselineError> {
    let write_err = |source| BaselineError::Write {
        path: path.to_path_buf(),
        source,
    };

    let entries = store.entries();
    let json = serde_json::to_vec_pretty(&entries).map_err(|e| write_err(std::io::Error::other(e)))?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let tmp = temp_path(path);
    if let Err(e) = write_synced(&tmp, &json) {
        let _ = std::fs::remove_file(&tmp);
        return Err(write_err(e));
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(write_err(e));
    }

    debug!(path = %path.display(), records = entries.len(), "baseline saved");
    Ok(())
}

/// Sibling temp file; the UUID keeps concurrent savers from colliding.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".tmp.{}", uuid::Uuid::new_v4()));
    path.with_file_name(name)
}

fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}
