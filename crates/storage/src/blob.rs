use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use revdb_core::BlobHash;

use crate::error::StorageError;

/// Content-addressed, append-only storage for attachment bytes.
///
/// Blobs are keyed by their BLAKE3 digest. Writing the same bytes twice is a
/// no-op. Implementations must allow concurrent readers while a write is in
/// progress.
pub trait BlobStore: Send + Sync {
    fn put(&self, data: &[u8]) -> Result<BlobHash, StorageError>;

    fn get(&self, key: &BlobHash) -> Result<Vec<u8>, StorageError>;

    fn contains(&self, key: &BlobHash) -> Result<bool, StorageError>;
}

/// Blobs kept as one file per digest under a directory.
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &BlobHash) -> PathBuf {
        self.dir.join(key.to_hex())
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, data: &[u8]) -> Result<BlobHash, StorageError> {
        let key = BlobHash::of(data);
        let path = self.path_for(&key);
        if path.exists() {
            return Ok(key);
        }

        // Readers only ever see complete files: write aside, then rename into place.
        let partial = self
            .dir
            .join(format!(".{}.{}.partial", key.to_hex(), std::process::id()));
        {
            let mut file = fs::File::create(&partial)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&partial, &path) {
            let _ = fs::remove_file(&partial);
            return Err(StorageError::Io(e));
        }
        tracing::trace!(key = %key, bytes = data.len(), "blob written");
        Ok(key)
    }

    fn get(&self, key: &BlobHash) -> Result<Vec<u8>, StorageError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(format!("blob {key}")))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn contains(&self, key: &BlobHash) -> Result<bool, StorageError> {
        Ok(self.path_for(key).exists())
    }
}

/// Blobs held in memory, for in-memory stores and tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<BlobHash, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, data: &[u8]) -> Result<BlobHash, StorageError> {
        let key = BlobHash::of(data);
        self.blobs.write().entry(key).or_insert_with(|| data.to_vec());
        Ok(key)
    }

    fn get(&self, key: &BlobHash) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("blob {key}")))
    }

    fn contains(&self, key: &BlobHash) -> Result<bool, StorageError> {
        Ok(self.blobs.read().contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_store_roundtrip_and_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path().join("blobs")).unwrap();

        let k1 = store.put(b"hello").unwrap();
        let k2 = store.put(b"hello").unwrap();
        assert_eq!(k1, k2);
        assert_eq!(store.get(&k1).unwrap(), b"hello");
        assert!(store.contains(&k1).unwrap());

        let files: Vec<_> = fs::read_dir(store.dir()).unwrap().collect();
        assert_eq!(files.len(), 1, "no partial files should remain");
    }

    #[test]
    fn fs_store_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        let missing = BlobHash::of(b"never written");
        assert!(!store.contains(&missing).unwrap());
        assert!(matches!(store.get(&missing), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryBlobStore::new();
        assert!(store.is_empty());
        let key = store.put(b"abc").unwrap();
        store.put(b"abc").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).unwrap(), b"abc");
    }
}
