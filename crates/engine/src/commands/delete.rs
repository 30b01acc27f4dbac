use revdb_core::{ChangeEvent, DocumentRevision, RevId, EMPTY_BODY};
use revdb_storage::{NewRevision, RevisionStore};

use super::snapshot;
use crate::command::Command;
use crate::error::EngineError;
use crate::writer::Writer;

/// Tombstone one leaf.
///
/// The tombstone inherits the deleted leaf's `current` flag, so deleting a
/// losing branch leaves the winner alone. Deleting the winner re-runs the
/// election, which hands the document to any remaining live leaf.
#[derive(Debug, Clone)]
pub struct DeleteDocument {
    pub doc_id: String,
    pub rev_id: RevId,
}

impl DeleteDocument {
    pub fn new(doc_id: impl Into<String>, rev_id: RevId) -> Self {
        Self {
            doc_id: doc_id.into(),
            rev_id,
        }
    }
}

impl Command for DeleteDocument {
    type Output = DocumentRevision;

    fn execute(self, writer: &mut Writer) -> Result<DocumentRevision, EngineError> {
        let Self { doc_id, rev_id } = self;
        writer.transact(|w| {
            let doc = w
                .storage()
                .doc_numeric_id(&doc_id)?
                .ok_or_else(|| EngineError::NotFound(format!("document {doc_id}")))?;
            let target = w
                .storage()
                .get_revision(&doc_id, &rev_id)?
                .ok_or_else(|| EngineError::NotFound(format!("revision {doc_id}@{rev_id}")))?;
            if target.deleted {
                return Err(EngineError::NotFound(format!("{doc_id}@{rev_id} is already deleted")));
            }
            if !w.storage().is_leaf(target.sequence)? {
                return Err(EngineError::Conflict(format!("{doc_id}@{rev_id} is not a leaf")));
            }

            let prev_winner = w.storage().current_winner(doc)?;
            let tombstone_id = RevId::derive(Some(&rev_id), true, EMPTY_BODY, &[]);
            if target.current {
                w.storage_mut().set_current(target.sequence, false)?;
            }
            let sequence = w
                .storage_mut()
                .insert_revision(&NewRevision {
                    doc_numeric_id: doc,
                    rev_id: &tombstone_id,
                    parent: Some(target.sequence),
                    deleted: true,
                    current: target.current,
                    available: true,
                    body: EMPTY_BODY,
                })?
                .sequence();

            let new_winner = if target.current {
                w.storage_mut().pick_winner(doc)?
            } else {
                prev_winner.clone()
            };
            w.storage_mut().stage_event(ChangeEvent {
                doc_id: doc_id.clone(),
                prev_winner,
                new_winner,
            });
            tracing::debug!(doc_id = %doc_id, rev_id = %tombstone_id, %sequence, "revision deleted");
            snapshot(w.storage(), sequence)
        })
    }
}

/// Tombstone every live leaf of a document as one atomic group. If any
/// single delete fails, none of them are kept.
#[derive(Debug, Clone)]
pub struct DeleteAllLeaves {
    pub doc_id: String,
}

impl DeleteAllLeaves {
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
        }
    }
}

impl Command for DeleteAllLeaves {
    type Output = Vec<DocumentRevision>;

    fn execute(self, writer: &mut Writer) -> Result<Vec<DocumentRevision>, EngineError> {
        writer.transact(|w| {
            let live: Vec<RevId> = w
                .storage()
                .leaf_revisions(&self.doc_id)?
                .into_iter()
                .filter(|leaf| !leaf.deleted)
                .map(|leaf| leaf.rev_id)
                .collect();

            let mut tombstones = Vec::with_capacity(live.len());
            for rev_id in live {
                tombstones.push(DeleteDocument::new(self.doc_id.clone(), rev_id).execute(w)?);
            }
            Ok(tombstones)
        })
    }
}
