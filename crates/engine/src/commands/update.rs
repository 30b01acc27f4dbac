use revdb_core::{validate_body, AttachmentChanges, ChangeEvent, DocumentRevision, RevId};
use revdb_storage::{NewRevision, RevisionStore};

use super::snapshot;
use crate::attachments;
use crate::command::Command;
use crate::error::EngineError;
use crate::writer::Writer;

/// Add a child to the current winner. Fails with `Conflict` when
/// `expected` is no longer the winner.
#[derive(Debug, Clone)]
pub struct UpdateDocument {
    pub doc_id: String,
    pub expected: RevId,
    pub body: Vec<u8>,
    pub attachments: AttachmentChanges,
}

impl UpdateDocument {
    pub fn new(doc_id: impl Into<String>, expected: RevId, body: impl Into<Vec<u8>>) -> Self {
        Self {
            doc_id: doc_id.into(),
            expected,
            body: body.into(),
            attachments: AttachmentChanges::none(),
        }
    }

    pub fn with_attachments(mut self, changes: AttachmentChanges) -> Self {
        self.attachments = changes;
        self
    }
}

impl Command for UpdateDocument {
    type Output = DocumentRevision;

    fn execute(self, writer: &mut Writer) -> Result<DocumentRevision, EngineError> {
        validate_body(&self.body)?;
        attachments::check_names(&self.attachments.put)?;
        let Self {
            doc_id,
            expected,
            body,
            attachments: changes,
        } = self;

        writer.transact(|w| {
            let doc = w
                .storage()
                .doc_numeric_id(&doc_id)?
                .ok_or_else(|| EngineError::NotFound(format!("document {doc_id}")))?;
            let parent = w
                .storage()
                .revision_sequence(doc, &expected)?
                .ok_or_else(|| EngineError::NotFound(format!("revision {doc_id}@{expected}")))?;
            let winner = w.storage().current_winner(doc)?.ok_or_else(|| {
                tracing::error!(doc_id = %doc_id, "document has no current revision");
                EngineError::InvariantViolation(format!("document {doc_id} has no winner"))
            })?;
            if winner.sequence != parent {
                return Err(EngineError::Conflict(format!(
                    "{doc_id}@{expected} is not the current revision ({})",
                    winner.rev_id
                )));
            }
            if winner.deleted {
                return Err(EngineError::NotFound(format!("document {doc_id} is deleted")));
            }

            let generation = expected.generation() + 1;
            let mut final_set = attachments::carried_forward(w.storage().attachments_for(parent)?, &changes)?;
            let carried = final_set.len();
            final_set.extend(attachments::prepare(w.blobs(), &changes.put, generation)?);
            let rev_id = RevId::derive(Some(&expected), false, &body, &attachments::digests(&final_set));

            w.storage_mut().set_current(parent, false)?;
            let sequence = w
                .storage_mut()
                .insert_revision(&NewRevision {
                    doc_numeric_id: doc,
                    rev_id: &rev_id,
                    parent: Some(parent),
                    deleted: false,
                    current: true,
                    available: true,
                    body: &body,
                })?
                .sequence();

            // Carried attachments keep their blob and revpos; only new rows are written.
            let (kept, fresh) = final_set.split_at(carried);
            let skip: Vec<&str> = changes
                .remove
                .iter()
                .map(String::as_str)
                .chain(changes.put.iter().map(|a| a.name.as_str()))
                .collect();
            let copied = w.storage_mut().copy_attachments(parent, sequence, &skip)?;
            if copied != kept.len() {
                return Err(EngineError::InvariantViolation(format!(
                    "copied {copied} attachments to {doc_id}@{rev_id}, expected {}",
                    kept.len()
                )));
            }
            attachments::associate(w.storage_mut(), sequence, fresh)?;

            let new_winner = w.storage_mut().pick_winner(doc)?;
            w.storage_mut().stage_event(ChangeEvent {
                doc_id: doc_id.clone(),
                prev_winner: Some(winner),
                new_winner,
            });
            tracing::debug!(doc_id = %doc_id, rev_id = %rev_id, %sequence, "document updated");
            snapshot(w.storage(), sequence)
        })
    }
}
