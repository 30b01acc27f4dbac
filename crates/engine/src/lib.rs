mod attachments;
pub mod command;
pub mod commands;
pub mod config;
pub mod error;
pub mod feed;
pub mod queue;
pub mod writer;

pub use command::Command;
pub use commands::{
    CreateDocument, DeleteAllLeaves, DeleteDocument, ForceInsert, ForceInsertOutcome, UpdateDocument,
};
pub use config::StoreConfig;
pub use error::{EngineError, ForceInsertFailure};
pub use feed::ChangeFeed;
pub use queue::{Pending, WriterQueue};
pub use writer::Writer;

use std::sync::mpsc::Receiver;
use std::sync::Arc;

use revdb_core::{
    is_conflicted, Attachment, AttachmentChanges, ChangeEvent, DocumentRevision, RevId, Sequence,
    UnsavedAttachment,
};
use revdb_storage::{
    BlobStore, Changes, FsBlobStore, LocalDocument, MemoryBlobStore, RevisionStore, SqliteStorage,
};

/// What a batch of force-inserts did.
#[derive(Debug, Clone, Default)]
pub struct ForceInsertReport {
    pub inserted: Vec<DocumentRevision>,
    pub already_present: usize,
}

/// An open document store.
///
/// All reads and writes run on one writer thread in submission order. The
/// handle is `Send + Sync`; share it behind an `Arc` to submit from several
/// threads.
pub struct Store {
    queue: WriterQueue,
    blobs: Arc<dyn BlobStore>,
    feed: Arc<ChangeFeed>,
}

impl Store {
    /// Open a store. A file-backed store without an explicit attachment
    /// directory keeps its blobs next to the database, in `<path>.attachments`.
    pub fn open(config: StoreConfig) -> Result<Self, EngineError> {
        let blobs: Arc<dyn BlobStore> = match (&config.attachments_dir, &config.path) {
            (Some(dir), _) => Arc::new(FsBlobStore::open(dir)?),
            (None, Some(path)) => Arc::new(FsBlobStore::open(path.with_extension("attachments"))?),
            (None, None) => Arc::new(MemoryBlobStore::new()),
        };
        Self::open_with_blob_store(config, blobs)
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::open(StoreConfig::in_memory())
    }

    pub fn open_with_blob_store(config: StoreConfig, blobs: Arc<dyn BlobStore>) -> Result<Self, EngineError> {
        let storage = match &config.path {
            Some(path) => SqliteStorage::open(path, &config.storage_options())?,
            None => SqliteStorage::open_in_memory()?,
        };
        let feed = Arc::new(ChangeFeed::new(config.change_history));
        let queue = WriterQueue::start(Writer::new(storage, Arc::clone(&blobs), Arc::clone(&feed)))?;
        tracing::info!(path = ?config.path, "store opened");
        Ok(Self { queue, blobs, feed })
    }

    /// Queue a command without waiting for it.
    pub fn submit<C: Command>(&self, command: C) -> Result<Pending<C::Output>, EngineError> {
        self.queue.submit(command)
    }

    /// Queue a command and wait for its result.
    pub fn execute<C: Command>(&self, command: C) -> Result<C::Output, EngineError> {
        self.queue.execute(command)
    }

    // Mutations

    pub fn create(
        &self,
        doc_id: Option<&str>,
        body: impl Into<Vec<u8>>,
        attachments: Vec<UnsavedAttachment>,
    ) -> Result<DocumentRevision, EngineError> {
        self.execute(CreateDocument {
            doc_id: doc_id.map(str::to_string),
            body: body.into(),
            attachments,
        })
    }

    pub fn update(
        &self,
        doc_id: &str,
        expected: &RevId,
        body: impl Into<Vec<u8>>,
        attachments: AttachmentChanges,
    ) -> Result<DocumentRevision, EngineError> {
        self.execute(
            UpdateDocument::new(doc_id, expected.clone(), body).with_attachments(attachments),
        )
    }

    pub fn delete(&self, doc_id: &str, rev_id: &RevId) -> Result<DocumentRevision, EngineError> {
        self.execute(DeleteDocument::new(doc_id, rev_id.clone()))
    }

    pub fn delete_all_leaves(&self, doc_id: &str) -> Result<Vec<DocumentRevision>, EngineError> {
        self.execute(DeleteAllLeaves::new(doc_id))
    }

    pub fn force_insert(&self, item: ForceInsert) -> Result<ForceInsertOutcome, EngineError> {
        self.execute(item)
    }

    /// Force-insert a batch. Each item is its own transaction; items that
    /// fail are reported together in [`EngineError::PartialFailure`] after
    /// the rest have been applied.
    pub fn force_insert_all(&self, items: Vec<ForceInsert>) -> Result<ForceInsertReport, EngineError> {
        let mut pending = Vec::with_capacity(items.len());
        for item in items {
            let doc_id = item.doc_id.clone();
            let rev_id = item.rev_id().map(ToString::to_string).unwrap_or_default();
            pending.push((doc_id, rev_id, self.submit(item)?));
        }

        let mut report = ForceInsertReport::default();
        let mut failures = Vec::new();
        for (doc_id, rev_id, reply) in pending {
            match reply.wait() {
                Ok(ForceInsertOutcome::Inserted(rev)) => report.inserted.push(rev),
                Ok(ForceInsertOutcome::AlreadyPresent) => report.already_present += 1,
                Err(EngineError::QueueClosed) => return Err(EngineError::QueueClosed),
                Err(e) => {
                    tracing::warn!(doc_id = %doc_id, rev_id = %rev_id, error = %e, "force-insert failed");
                    failures.push(ForceInsertFailure {
                        doc_id,
                        rev_id,
                        recoverable: e.is_recoverable(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(EngineError::PartialFailure {
                applied: report.inserted.len() + report.already_present,
                failures,
            })
        }
    }

    // Reads

    /// The given revision, or the current winner when `rev_id` is `None`.
    /// A deleted winner is returned with `deleted` set.
    pub fn read(&self, doc_id: &str, rev_id: Option<&RevId>) -> Result<DocumentRevision, EngineError> {
        let doc_id = doc_id.to_string();
        let rev_id = rev_id.cloned();
        self.execute(move |w: &mut Writer| -> Result<DocumentRevision, EngineError> {
            let found = match &rev_id {
                Some(rev_id) => w.storage().get_revision(&doc_id, rev_id)?,
                None => w.storage().current_revision(&doc_id)?,
            };
            found.ok_or_else(|| match &rev_id {
                Some(rev_id) => EngineError::NotFound(format!("revision {doc_id}@{rev_id}")),
                None => EngineError::NotFound(format!("document {doc_id}")),
            })
        })
    }

    pub fn leaves(&self, doc_id: &str) -> Result<Vec<DocumentRevision>, EngineError> {
        let doc_id = doc_id.to_string();
        self.execute(move |w: &mut Writer| -> Result<Vec<DocumentRevision>, EngineError> {
            let leaves = w.storage().leaf_revisions(&doc_id)?;
            if leaves.is_empty() {
                return Err(EngineError::NotFound(format!("document {doc_id}")));
            }
            Ok(leaves)
        })
    }

    /// True when the document has more than one live leaf.
    pub fn is_conflicted(&self, doc_id: &str) -> Result<bool, EngineError> {
        let doc_id = doc_id.to_string();
        self.execute(move |w: &mut Writer| -> Result<bool, EngineError> {
            let doc = w
                .storage()
                .doc_numeric_id(&doc_id)?
                .ok_or_else(|| EngineError::NotFound(format!("document {doc_id}")))?;
            Ok(is_conflicted(&w.storage().leaves(doc)?))
        })
    }

    /// True when the document exists and its winner is not a tombstone.
    pub fn contains(&self, doc_id: &str) -> Result<bool, EngineError> {
        let doc_id = doc_id.to_string();
        self.execute(move |w: &mut Writer| -> Result<bool, EngineError> {
            Ok(w.storage()
                .current_revision(&doc_id)?
                .is_some_and(|rev| !rev.deleted))
        })
    }

    pub fn contains_revision(&self, doc_id: &str, rev_id: &RevId) -> Result<bool, EngineError> {
        let doc_id = doc_id.to_string();
        let rev_id = rev_id.clone();
        self.execute(move |w: &mut Writer| -> Result<bool, EngineError> {
            Ok(match w.storage().doc_numeric_id(&doc_id)? {
                Some(doc) => w.storage().revision_sequence(doc, &rev_id)?.is_some(),
                None => false,
            })
        })
    }

    /// Ancestry of a revision, root first, ending with the revision itself.
    pub fn revision_history(&self, doc_id: &str, rev_id: &RevId) -> Result<Vec<RevId>, EngineError> {
        let doc_id = doc_id.to_string();
        let rev_id = rev_id.clone();
        self.execute(move |w: &mut Writer| -> Result<Vec<RevId>, EngineError> {
            Ok(w.storage().revision_history(&doc_id, &rev_id)?)
        })
    }

    /// Winners of the documents changed after `since`, in sequence order.
    pub fn changes(&self, since: Sequence, limit: usize) -> Result<Changes, EngineError> {
        self.execute(move |w: &mut Writer| -> Result<Changes, EngineError> {
            Ok(w.storage().changes(since, limit)?)
        })
    }

    pub fn conflicted_ids(&self) -> Result<Vec<String>, EngineError> {
        self.execute(|w: &mut Writer| -> Result<Vec<String>, EngineError> {
            Ok(w.storage().conflicted_ids()?)
        })
    }

    /// Number of documents whose winner is not deleted.
    pub fn document_count(&self) -> Result<u64, EngineError> {
        self.execute(|w: &mut Writer| -> Result<u64, EngineError> { Ok(w.storage().document_count()?) })
    }

    pub fn last_sequence(&self) -> Result<Sequence, EngineError> {
        self.execute(|w: &mut Writer| -> Result<Sequence, EngineError> { Ok(w.storage().last_sequence()?) })
    }

    // Attachments

    pub fn attachments(&self, doc_id: &str, rev_id: &RevId) -> Result<Vec<Attachment>, EngineError> {
        Ok(self.read(doc_id, Some(rev_id))?.attachments)
    }

    /// Attachment metadata and its stored bytes.
    pub fn attachment(
        &self,
        doc_id: &str,
        rev_id: &RevId,
        name: &str,
    ) -> Result<(Attachment, Vec<u8>), EngineError> {
        let attachment = self
            .attachments(doc_id, rev_id)?
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| EngineError::NotFound(format!("attachment {name} on {doc_id}@{rev_id}")))?;
        let data = self.blobs.get(&attachment.digest)?;
        Ok((attachment, data))
    }

    // Local documents

    pub fn put_local(&self, doc_id: &str, body: impl Into<Vec<u8>>) -> Result<LocalDocument, EngineError> {
        let doc_id = doc_id.to_string();
        let body = body.into();
        revdb_core::validate_body(&body)?;
        self.execute(move |w: &mut Writer| -> Result<LocalDocument, EngineError> {
            w.transact(|w| Ok(w.storage_mut().put_local(&doc_id, &body)?))
        })
    }

    pub fn get_local(&self, doc_id: &str) -> Result<LocalDocument, EngineError> {
        let doc_id = doc_id.to_string();
        self.execute(move |w: &mut Writer| -> Result<LocalDocument, EngineError> {
            w.storage()
                .get_local(&doc_id)?
                .ok_or_else(|| EngineError::NotFound(format!("local document {doc_id}")))
        })
    }

    pub fn delete_local(&self, doc_id: &str) -> Result<(), EngineError> {
        let doc_id = doc_id.to_string();
        self.execute(move |w: &mut Writer| -> Result<(), EngineError> {
            let removed = w.transact(|w| Ok(w.storage_mut().delete_local(&doc_id)?))?;
            if !removed {
                return Err(EngineError::NotFound(format!("local document {doc_id}")));
            }
            Ok(())
        })
    }

    // Maintenance and notification

    /// Reclaim free space in the database file.
    pub fn compact(&self) -> Result<(), EngineError> {
        self.execute(|w: &mut Writer| -> Result<(), EngineError> {
            w.storage().vacuum()?;
            tracing::info!("store compacted");
            Ok(())
        })
    }

    /// Receive every change event committed from now on. The channel is
    /// unbounded, so keep draining it or drop it.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.feed.subscribe()
    }

    /// Receive change events through a buffer of `capacity`. A subscriber
    /// that lets the buffer fill up is disconnected.
    pub fn subscribe_bounded(&self, capacity: usize) -> Receiver<ChangeEvent> {
        self.feed.subscribe_bounded(capacity)
    }

    /// The most recent change events still held by the feed.
    pub fn recent_changes(&self) -> Vec<ChangeEvent> {
        self.feed.recent()
    }

    pub fn blob_store(&self) -> &dyn BlobStore {
        self.blobs.as_ref()
    }

    /// Finish queued work and stop the writer. Later calls fail with
    /// `QueueClosed`.
    pub fn close(&self) {
        self.queue.shutdown();
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}
