use revdb_core::{Attachment, DocNumericId, DocumentRevision, Leaf, RevId, Sequence, WinnerRef};

use crate::error::StorageError;

/// A revision row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewRevision<'a> {
    pub doc_numeric_id: DocNumericId,
    pub rev_id: &'a RevId,
    pub parent: Option<Sequence>,
    pub deleted: bool,
    pub current: bool,
    pub available: bool,
    pub body: &'a [u8],
}

/// Result of a revision insert. Re-inserting an existing `(doc, rev)` pair
/// reports the row that is already there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(Sequence),
    Existing(Sequence),
}

impl InsertOutcome {
    pub fn sequence(&self) -> Sequence {
        match self {
            Self::Inserted(s) | Self::Existing(s) => *s,
        }
    }
}

/// One page of the changes query.
#[derive(Debug, Clone)]
pub struct Changes {
    pub results: Vec<DocumentRevision>,
    pub last_sequence: Sequence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDocument {
    pub doc_id: String,
    pub rev_id: RevId,
    pub body: Vec<u8>,
}

/// Reads and writes over the revision tree. All writes assume the caller has
/// opened a transaction on the same connection.
pub trait RevisionStore {
    // Documents

    fn doc_numeric_id(&self, doc_id: &str) -> Result<Option<DocNumericId>, StorageError>;

    fn insert_document(&mut self, doc_id: &str) -> Result<DocNumericId, StorageError>;

    fn document_count(&self) -> Result<u64, StorageError>;

    // Revisions

    fn insert_revision(&mut self, rev: &NewRevision<'_>) -> Result<InsertOutcome, StorageError>;

    fn set_current(&mut self, sequence: Sequence, current: bool) -> Result<(), StorageError>;

    fn revision_sequence(
        &self,
        doc_numeric_id: DocNumericId,
        rev_id: &RevId,
    ) -> Result<Option<Sequence>, StorageError>;

    fn get_revision(
        &self,
        doc_id: &str,
        rev_id: &RevId,
    ) -> Result<Option<DocumentRevision>, StorageError>;

    fn get_by_sequence(&self, sequence: Sequence) -> Result<Option<DocumentRevision>, StorageError>;

    fn current_revision(&self, doc_id: &str) -> Result<Option<DocumentRevision>, StorageError>;

    fn current_winner(&self, doc_numeric_id: DocNumericId) -> Result<Option<WinnerRef>, StorageError>;

    fn is_leaf(&self, sequence: Sequence) -> Result<bool, StorageError>;

    fn leaves(&self, doc_numeric_id: DocNumericId) -> Result<Vec<Leaf>, StorageError>;

    fn leaf_revisions(&self, doc_id: &str) -> Result<Vec<DocumentRevision>, StorageError>;

    /// Elect the winner among the document's leaves and move the `current`
    /// flag onto it.
    fn pick_winner(&mut self, doc_numeric_id: DocNumericId) -> Result<Option<WinnerRef>, StorageError>;

    /// Ancestor chain of a revision, root first, ending with the revision itself.
    fn revision_history(&self, doc_id: &str, rev_id: &RevId) -> Result<Vec<RevId>, StorageError>;

    fn changes(&self, since: Sequence, limit: usize) -> Result<Changes, StorageError>;

    fn conflicted_ids(&self) -> Result<Vec<String>, StorageError>;

    fn last_sequence(&self) -> Result<Sequence, StorageError>;

    // Attachments

    fn insert_attachment(
        &mut self,
        sequence: Sequence,
        attachment: &Attachment,
    ) -> Result<(), StorageError>;

    /// Copy attachment associations from one revision to another, skipping
    /// the named attachments. Blob bytes are not touched.
    fn copy_attachments(
        &mut self,
        from: Sequence,
        to: Sequence,
        skip: &[&str],
    ) -> Result<usize, StorageError>;

    fn attachments_for(&self, sequence: Sequence) -> Result<Vec<Attachment>, StorageError>;

    // Local documents

    fn put_local(&mut self, doc_id: &str, body: &[u8]) -> Result<LocalDocument, StorageError>;

    fn get_local(&self, doc_id: &str) -> Result<Option<LocalDocument>, StorageError>;

    fn delete_local(&mut self, doc_id: &str) -> Result<bool, StorageError>;
}
