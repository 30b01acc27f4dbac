//! The mutation commands. Each runs inside its own transaction level, so any
//! of them can be composed into a larger atomic group.

mod create;
mod delete;
mod force_insert;
mod update;

pub use create::CreateDocument;
pub use delete::{DeleteAllLeaves, DeleteDocument};
pub use force_insert::{ForceInsert, ForceInsertOutcome};
pub use update::UpdateDocument;

use revdb_core::{DocumentRevision, Sequence};
use revdb_storage::{RevisionStore, SqliteStorage};

use crate::error::EngineError;

/// Re-read a revision this transaction just wrote.
fn snapshot(storage: &SqliteStorage, sequence: Sequence) -> Result<DocumentRevision, EngineError> {
    storage.get_by_sequence(sequence)?.ok_or_else(|| {
        tracing::error!(%sequence, "inserted revision vanished");
        EngineError::InvariantViolation(format!("revision {sequence} missing after insert"))
    })
}
