use revdb_core::{validate_body, ChangeEvent, DocumentRevision, RevId, UnsavedAttachment, EMPTY_BODY};
use revdb_storage::{NewRevision, RevisionStore};

use super::snapshot;
use crate::attachments;
use crate::command::Command;
use crate::error::EngineError;
use crate::writer::Writer;

/// Merge a revision from another peer, along with whatever part of its
/// ancestry is missing here.
///
/// `history` lists revision ids root first and ends with the revision being
/// inserted. Ancestors not known locally are inserted as unavailable stubs
/// hanging off the deepest known one, so the tree stays connected however
/// out of order revisions arrive. If no ancestor is known the earliest entry
/// becomes a root.
#[derive(Debug, Clone)]
pub struct ForceInsert {
    pub doc_id: String,
    pub history: Vec<RevId>,
    pub deleted: bool,
    /// `None` inserts the revision itself as a stub.
    pub body: Option<Vec<u8>>,
    pub attachments: Vec<UnsavedAttachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForceInsertOutcome {
    Inserted(DocumentRevision),
    /// The revision was already in the tree; nothing changed.
    AlreadyPresent,
}

impl ForceInsert {
    pub fn new(doc_id: impl Into<String>, history: Vec<RevId>) -> Self {
        Self {
            doc_id: doc_id.into(),
            history,
            deleted: false,
            body: None,
            attachments: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    pub fn with_attachment(mut self, attachment: UnsavedAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn rev_id(&self) -> Option<&RevId> {
        self.history.last()
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.doc_id.is_empty() {
            return Err(EngineError::InvalidInput("document id is empty".into()));
        }
        if self.history.is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "empty revision history for {}",
                self.doc_id
            )));
        }
        for pair in self.history.windows(2) {
            if pair[1].generation() != pair[0].generation() + 1 {
                return Err(EngineError::InvalidInput(format!(
                    "revision history for {} jumps from {} to {}",
                    self.doc_id, pair[0], pair[1]
                )));
            }
        }
        if let Some(body) = &self.body {
            validate_body(body)?;
        }
        attachments::check_names(&self.attachments)
    }
}

impl Command for ForceInsert {
    type Output = ForceInsertOutcome;

    fn execute(self, writer: &mut Writer) -> Result<ForceInsertOutcome, EngineError> {
        self.validate()?;
        let Self {
            doc_id,
            history,
            deleted,
            body,
            attachments: incoming,
        } = self;
        let Some((leaf_id, ancestors)) = history.split_last() else {
            return Err(EngineError::InvalidInput(format!("empty revision history for {doc_id}")));
        };

        writer.transact(|w| {
            let doc = match w.storage().doc_numeric_id(&doc_id)? {
                Some(doc) => doc,
                None => w.storage_mut().insert_document(&doc_id)?,
            };
            if w.storage().revision_sequence(doc, leaf_id)?.is_some() {
                tracing::trace!(doc_id = %doc_id, rev_id = %leaf_id, "revision already present");
                return Ok(ForceInsertOutcome::AlreadyPresent);
            }
            let prev_winner = w.storage().current_winner(doc)?;

            // Walk back to the deepest ancestor we already have.
            let mut parent = None;
            let mut missing_from = 0;
            for (i, rev_id) in ancestors.iter().enumerate().rev() {
                if let Some(sequence) = w.storage().revision_sequence(doc, rev_id)? {
                    parent = Some(sequence);
                    missing_from = i + 1;
                    break;
                }
            }

            for rev_id in &ancestors[missing_from..] {
                let stub = w.storage_mut().insert_revision(&NewRevision {
                    doc_numeric_id: doc,
                    rev_id,
                    parent,
                    deleted: false,
                    current: false,
                    available: false,
                    body: EMPTY_BODY,
                })?;
                parent = Some(stub.sequence());
            }

            let available = body.is_some() || deleted;
            let body = body.as_deref().unwrap_or(EMPTY_BODY);
            let sequence = w
                .storage_mut()
                .insert_revision(&NewRevision {
                    doc_numeric_id: doc,
                    rev_id: leaf_id,
                    parent,
                    deleted,
                    current: false,
                    available,
                    body,
                })?
                .sequence();

            for attachment in &incoming {
                let stored = attachments::store_blob(w.blobs(), attachment, leaf_id.generation())?;
                w.storage_mut().insert_attachment(sequence, &stored)?;
            }

            let new_winner = w.storage_mut().pick_winner(doc)?;
            w.storage_mut().stage_event(ChangeEvent {
                doc_id: doc_id.clone(),
                prev_winner,
                new_winner,
            });
            tracing::debug!(
                doc_id = %doc_id,
                rev_id = %leaf_id,
                %sequence,
                stubs = ancestors.len() - missing_from,
                "revision force-inserted"
            );
            Ok(ForceInsertOutcome::Inserted(snapshot(w.storage(), sequence)?))
        })
    }
}
