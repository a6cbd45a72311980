use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chunksync_chunker::Chunk;
use serde::{Deserialize, Serialize};

/// Metadata of the last chunk uploaded under an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub identifier: String,
    /// SHA-256 hex digest of the uploaded bytes.
    pub content_hash: String,
    pub index: usize,
}

impl ChunkRecord {
    /// Returns `true` if `chunk` carries the same content as this record.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.content_hash == chunk.checksum
    }
}

impl From<&Chunk> for ChunkRecord {
    fn from(chunk: &Chunk) -> Self {
        Self {
            identifier: chunk.id.clone(),
            content_hash: chunk.checksum.clone(),
            index: chunk.index,
        }
    }
}

/// Shared access to the dedup ledger.
///
/// Implementations must be safe to call from many workers at once. Each call
/// is atomic on its own; serializing a read-upload-write sequence for one
/// identifier is the caller's job.
pub trait BaselineStore: Send + Sync {
    /// Returns the record stored for `identifier`.
    fn get(&self, identifier: &str) -> Option<ChunkRecord>;

    /// Inserts or replaces the record for `record.identifier`.
    fn put(&self, record: ChunkRecord);

    /// Returns a point-in-time copy of every record, ordered by identifier.
    fn entries(&self) -> BTreeMap<String, ChunkRecord>;

    /// Returns `true` if `chunk` is absent or recorded with a different hash.
    fn is_dirty(&self, chunk: &Chunk) -> bool {
        self.get(&chunk.id).is_none_or(|record| !record.matches(chunk))
    }
}

/// In-memory baseline.
#[derive(Debug, Default)]
pub struct Baseline {
    records: RwLock<HashMap<String, ChunkRecord>>,
}

impl Baseline {
    /// Creates an empty baseline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a baseline holding `records`.
    pub fn from_records(records: impl IntoIterator<Item = (String, ChunkRecord)>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().collect()),
        }
    }

    /// Number of recorded identifiers.
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }
}

impl BaselineStore for Baseline {
    fn get(&self, identifier: &str) -> Option<ChunkRecord> {
        self.records.read().unwrap().get(identifier).cloned()
    }

    fn put(&self, record: ChunkRecord) {
        let mut records = self.records.write().unwrap();
        records.insert(record.identifier.clone(), record);
    }

    fn entries(&self) -> BTreeMap<String, ChunkRecord> {
        let records = self.records.read().unwrap();
        records
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn chunk(index: usize, checksum: &str) -> Chunk {
        Chunk {
            id: format!("file.bin.chunk.{index}"),
            index,
            offset: index as u64 * 4,
            len: 4,
            checksum: checksum.into(),
            artifact: PathBuf::from(format!("file.bin.chunk.{index}")),
        }
    }

    #[test]
    fn new_baseline_is_empty() {
        let baseline = Baseline::new();
        assert!(baseline.is_empty());
        assert!(baseline.get("file.bin.chunk.0").is_none());
    }

    #[test]
    fn record_from_chunk() {
        let record = ChunkRecord::from(&chunk(2, "abc"));
        assert_eq!(record.identifier, "file.bin.chunk.2");
        assert_eq!(record.content_hash, "abc");
        assert_eq!(record.index, 2);
    }

    #[test]
    fn dirty_when_absent_or_changed() {
        let baseline = Baseline::new();
        let c = chunk(0, "aaa");
        assert!(baseline.is_dirty(&c));

        baseline.put(ChunkRecord::from(&c));
        assert!(!baseline.is_dirty(&c));
        assert!(baseline.is_dirty(&chunk(0, "bbb")));
    }

    #[test]
    fn put_overwrites() {
        let baseline = Baseline::new();
        baseline.put(ChunkRecord::from(&chunk(0, "old")));
        baseline.put(ChunkRecord::from(&chunk(0, "new")));
        assert_eq!(baseline.len(), 1);
        assert_eq!(baseline.get("file.bin.chunk.0").unwrap().content_hash, "new");
    }

    #[test]
    fn entries_are_ordered_snapshot() {
        let baseline = Baseline::new();
        for i in [2, 0, 1] {
            baseline.put(ChunkRecord::from(&chunk(i, "h")));
        }
        let snapshot = baseline.entries();
        let keys: Vec<&String> = snapshot.keys().collect();
        assert_eq!(
            keys,
            vec!["file.bin.chunk.0", "file.bin.chunk.1", "file.bin.chunk.2"]
        );

        baseline.put(ChunkRecord::from(&chunk(3, "h")));
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn concurrent_puts_are_not_lost() {
        use std::sync::Arc;
        use std::thread;

        let baseline = Arc::new(Baseline::new());
        let mut handles = vec![];

        for t in 0..8 {
            let b = Arc::clone(&baseline);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    b.put(ChunkRecord::from(&chunk(t * 100 + i, "h")));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(baseline.len(), 800);
    }
}
