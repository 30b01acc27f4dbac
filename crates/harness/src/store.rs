use std::sync::Arc;

use revdb_core::{AttachmentChanges, DocumentRevision, RevId};
use revdb_engine::{EngineError, ForceInsert, Store, StoreConfig, Writer};
use revdb_storage::{BlobStore, StorageError};
use serde_json::Value;
use tempfile::TempDir;

/// A store opened for one test. On-disk stores live in a temp directory that
/// is removed when the fixture is dropped.
pub struct TestStore {
    pub store: Store,
    dir: Option<TempDir>,
}

impl TestStore {
    pub fn new() -> Result<Self, EngineError> {
        crate::init_tracing();
        Ok(Self {
            store: Store::open_in_memory()?,
            dir: None,
        })
    }

    pub fn on_disk() -> Result<Self, EngineError> {
        crate::init_tracing();
        let dir = tempfile::tempdir()?;
        let config = StoreConfig::default()
            .with_path(dir.path().join("store.sqlite"))
            .with_attachments_dir(dir.path().join("attachments"));
        Ok(Self {
            store: Store::open(config)?,
            dir: Some(dir),
        })
    }

    pub fn with_blob_store(blobs: Arc<dyn BlobStore>) -> Result<Self, EngineError> {
        crate::init_tracing();
        Ok(Self {
            store: Store::open_with_blob_store(StoreConfig::in_memory(), blobs)?,
            dir: None,
        })
    }

    pub fn dir(&self) -> Option<&std::path::Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    pub fn create_json(&self, doc_id: &str, body: Value) -> Result<DocumentRevision, EngineError> {
        self.store.create(Some(doc_id), body.to_string(), vec![])
    }

    pub fn update_json(
        &self,
        doc_id: &str,
        expected: &RevId,
        body: Value,
    ) -> Result<DocumentRevision, EngineError> {
        self.store
            .update(doc_id, expected, body.to_string(), AttachmentChanges::none())
    }

    pub fn winner(&self, doc_id: &str) -> Result<DocumentRevision, EngineError> {
        self.store.read(doc_id, None)
    }

    /// Add a sibling branch: a child of `base` with the given body, inserted
    /// the way a replicated edit from another peer would arrive.
    pub fn branch(&self, doc_id: &str, base: &RevId, body: Value) -> Result<RevId, EngineError> {
        let body = body.to_string();
        let child = RevId::derive(Some(base), false, body.as_bytes(), &[]);
        let mut history = self.store.revision_history(doc_id, base)?;
        history.push(child.clone());
        self.store
            .force_insert(ForceInsert::new(doc_id, history).with_body(body))?;
        Ok(child)
    }

    /// Number of revisions of the document flagged current, read straight
    /// from the revision table.
    pub fn current_flags(&self, doc_id: &str) -> Result<i64, EngineError> {
        let doc_id = doc_id.to_string();
        self.store.execute(move |w: &mut Writer| -> Result<i64, EngineError> {
            let count = w
                .storage()
                .conn()
                .query_row(
                    "SELECT COUNT(*) FROM revs JOIN docs ON revs.doc_id = docs.doc_id \
                     WHERE docs.docid = ?1 AND revs.current = 1",
                    [doc_id.as_str()],
                    |row| row.get(0),
                )
                .map_err(StorageError::from)?;
            Ok(count)
        })
    }
}
