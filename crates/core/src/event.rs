use crate::{RevId, Sequence};

/// Minimal description of a document's winning revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinnerRef {
    pub rev_id: RevId,
    pub sequence: Sequence,
    pub deleted: bool,
}

/// Emitted once per committed mutation, in commit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub doc_id: String,
    pub prev_winner: Option<WinnerRef>,
    pub new_winner: Option<WinnerRef>,
}

impl ChangeEvent {
    /// True when the document did not exist before this change.
    pub fn is_create(&self) -> bool {
        self.prev_winner.is_none()
    }

    /// True when the change left the document with a tombstone winner.
    pub fn is_delete(&self) -> bool {
        self.new_winner.as_ref().is_some_and(|w| w.deleted)
    }
}
