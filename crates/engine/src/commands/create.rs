use revdb_core::{new_doc_id, validate_body, ChangeEvent, DocumentRevision, RevId, UnsavedAttachment, WinnerRef};
use revdb_storage::{NewRevision, RevisionStore};

use super::snapshot;
use crate::attachments;
use crate::command::Command;
use crate::error::EngineError;
use crate::writer::Writer;

/// Insert the root revision of a new document.
#[derive(Debug, Clone)]
pub struct CreateDocument {
    /// `None` assigns a fresh id.
    pub doc_id: Option<String>,
    pub body: Vec<u8>,
    pub attachments: Vec<UnsavedAttachment>,
}

impl CreateDocument {
    pub fn new(doc_id: Option<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            doc_id,
            body: body.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: UnsavedAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

impl Command for CreateDocument {
    type Output = DocumentRevision;

    fn execute(self, writer: &mut Writer) -> Result<DocumentRevision, EngineError> {
        validate_body(&self.body)?;
        let doc_id = self.doc_id.unwrap_or_else(new_doc_id);
        if doc_id.is_empty() {
            return Err(EngineError::InvalidInput("document id is empty".into()));
        }

        writer.transact(|w| {
            if w.storage().doc_numeric_id(&doc_id)?.is_some() {
                return Err(EngineError::AlreadyExists(doc_id.clone()));
            }
            let doc = w.storage_mut().insert_document(&doc_id)?;

            let stored = attachments::prepare(w.blobs(), &self.attachments, 1)?;
            let rev_id = RevId::derive(None, false, &self.body, &attachments::digests(&stored));

            let sequence = w
                .storage_mut()
                .insert_revision(&NewRevision {
                    doc_numeric_id: doc,
                    rev_id: &rev_id,
                    parent: None,
                    deleted: false,
                    current: true,
                    available: true,
                    body: &self.body,
                })?
                .sequence();
            attachments::associate(w.storage_mut(), sequence, &stored)?;

            w.storage_mut().stage_event(ChangeEvent {
                doc_id: doc_id.clone(),
                prev_winner: None,
                new_winner: Some(WinnerRef {
                    rev_id: rev_id.clone(),
                    sequence,
                    deleted: false,
                }),
            });
            tracing::debug!(doc_id = %doc_id, rev_id = %rev_id, %sequence, "document created");
            snapshot(w.storage(), sequence)
        })
    }
}
