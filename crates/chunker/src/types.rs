use std::path::{Path, PathBuf};

/// A persisted chunk of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Stable identifier derived from the source path and index.
    pub id: String,
    /// 0-based position of the chunk within the source.
    pub index: usize,
    /// Byte offset within the source (`index * chunk_size`).
    pub offset: u64,
    /// Number of bytes in this chunk.
    pub len: usize,
    /// SHA-256 hex digest of the chunk bytes.
    pub checksum: String,
    /// Location of the artifact holding exactly the chunk bytes.
    pub artifact: PathBuf,
}

/// Raw bytes read from a source, before they are hashed and persisted.
#[derive(Debug, Clone)]
pub struct ChunkData {
    pub index: usize,
    pub offset: u64,
    pub data: Vec<u8>,
}

/// Returns the artifact location for chunk `index` of `source`:
/// `<source>.chunk.<index>`.
pub fn artifact_path(source: &Path, index: usize) -> PathBuf {
    let mut name = source.as_os_str().to_os_string();
    name.push(format!(".chunk.{index}"));
    PathBuf::from(name)
}

/// Returns the identifier of chunk `index` of `source`.
///
/// The identifier is the artifact path rendered as a string, so it is
/// scoped to one source file.
pub fn chunk_id(source: &Path, index: usize) -> String {
    artifact_path(source, index).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_appends_suffix() {
        let p = artifact_path(Path::new("/data/video.bin"), 3);
        assert_eq!(p, PathBuf::from("/data/video.bin.chunk.3"));
    }

    #[test]
    fn chunk_id_is_deterministic() {
        let a = chunk_id(Path::new("dir/file.dat"), 0);
        let b = chunk_id(Path::new("dir/file.dat"), 0);
        assert_eq!(a, b);
        assert_eq!(a, "dir/file.dat.chunk.0");
        assert_ne!(a, chunk_id(Path::new("dir/file.dat"), 1));
    }
}
