//! Linking attachment blobs to revisions.

use std::collections::HashSet;

use revdb_core::{Attachment, AttachmentChanges, BlobHash, Sequence, UnsavedAttachment};
use revdb_storage::{BlobStore, RevisionStore, SqliteStorage};

use crate::error::EngineError;

/// Write the bytes of one attachment to the blob store and describe it.
///
/// Runs inside the owning revision's transaction, so a rollback can leave an
/// unreferenced blob behind but never a reference to a missing one.
pub(crate) fn store_blob(
    blobs: &dyn BlobStore,
    attachment: &UnsavedAttachment,
    revpos: u64,
) -> Result<Attachment, EngineError> {
    let digest = blobs.put(&attachment.data)?;
    Ok(Attachment {
        name: attachment.name.clone(),
        content_type: attachment.content_type.clone(),
        encoding: attachment.encoding,
        length: attachment.length,
        encoded_length: attachment.data.len() as u64,
        digest,
        revpos,
    })
}

pub(crate) fn check_names(attachments: &[UnsavedAttachment]) -> Result<(), EngineError> {
    let mut seen = HashSet::new();
    for a in attachments {
        if a.name.is_empty() {
            return Err(EngineError::InvalidInput("attachment name is empty".into()));
        }
        if !seen.insert(a.name.as_str()) {
            return Err(EngineError::InvalidInput(format!(
                "attachment {} supplied twice",
                a.name
            )));
        }
    }
    Ok(())
}

/// Store every new attachment's bytes.
pub(crate) fn prepare(
    blobs: &dyn BlobStore,
    attachments: &[UnsavedAttachment],
    revpos: u64,
) -> Result<Vec<Attachment>, EngineError> {
    check_names(attachments)?;
    attachments
        .iter()
        .map(|a| store_blob(blobs, a, revpos))
        .collect()
}

pub(crate) fn associate(
    storage: &mut SqliteStorage,
    sequence: Sequence,
    attachments: &[Attachment],
) -> Result<(), EngineError> {
    for attachment in attachments {
        storage.insert_attachment(sequence, attachment)?;
    }
    Ok(())
}

pub(crate) fn digests(attachments: &[Attachment]) -> Vec<(&str, &BlobHash)> {
    attachments
        .iter()
        .map(|a| (a.name.as_str(), &a.digest))
        .collect()
}

/// The attachments an update starts from: the parent's set minus anything
/// removed or replaced. Fails if a removal names an attachment the parent
/// does not have.
pub(crate) fn carried_forward(
    parent: Vec<Attachment>,
    changes: &AttachmentChanges,
) -> Result<Vec<Attachment>, EngineError> {
    for name in &changes.remove {
        if !parent.iter().any(|a| &a.name == name) {
            return Err(EngineError::NotFound(format!("attachment {name}")));
        }
    }
    Ok(parent
        .into_iter()
        .filter(|a| !changes.remove.contains(&a.name) && !changes.put.iter().any(|p| p.name == a.name))
        .collect())
}

#[cfg(test)]
mod tests {
    use revdb_core::Encoding;
    use revdb_storage::MemoryBlobStore;

    use super::*;

    fn stored(name: &str, data: &[u8]) -> Attachment {
        Attachment {
            name: name.into(),
            content_type: "text/plain".into(),
            encoding: Encoding::Plain,
            length: data.len() as u64,
            encoded_length: data.len() as u64,
            digest: BlobHash::of(data),
            revpos: 1,
        }
    }

    #[test]
    fn prepare_rejects_duplicate_names() {
        let blobs = MemoryBlobStore::new();
        let dup = vec![
            UnsavedAttachment::plain("a", "text/plain", b"1".to_vec()),
            UnsavedAttachment::plain("a", "text/plain", b"2".to_vec()),
        ];
        assert!(matches!(prepare(&blobs, &dup, 1), Err(EngineError::InvalidInput(_))));
        assert!(blobs.is_empty());
    }

    #[test]
    fn carry_forward_drops_removed_and_replaced() {
        let parent = vec![stored("keep", b"k"), stored("gone", b"g"), stored("swap", b"s")];
        let changes = AttachmentChanges::none()
            .remove("gone")
            .put(UnsavedAttachment::plain("swap", "text/plain", b"new".to_vec()));
        let kept = carried_forward(parent, &changes).unwrap();
        let names: Vec<&str> = kept.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["keep"]);
    }

    #[test]
    fn removing_unknown_attachment_is_not_found() {
        let changes = AttachmentChanges::none().remove("missing");
        assert!(matches!(
            carried_forward(vec![], &changes),
            Err(EngineError::NotFound(_))
        ));
    }
}
