use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use revdb_core::BlobHash;
use revdb_storage::{BlobStore, MemoryBlobStore, StorageError};

/// An in-memory blob store that starts failing writes after a fixed number
/// of successful ones.
pub struct FailingBlobStore {
    inner: MemoryBlobStore,
    remaining: AtomicUsize,
}

impl FailingBlobStore {
    pub fn fail_after(successful_writes: usize) -> Self {
        Self {
            inner: MemoryBlobStore::new(),
            remaining: AtomicUsize::new(successful_writes),
        }
    }

    pub fn stored(&self) -> usize {
        self.inner.len()
    }
}

impl BlobStore for FailingBlobStore {
    fn put(&self, data: &[u8]) -> Result<BlobHash, StorageError> {
        let allowed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(StorageError::Io(io::Error::other("injected blob write failure")));
        }
        self.inner.put(data)
    }

    fn get(&self, key: &BlobHash) -> Result<Vec<u8>, StorageError> {
        self.inner.get(key)
    }

    fn contains(&self, key: &BlobHash) -> Result<bool, StorageError> {
        self.inner.contains(key)
    }
}
