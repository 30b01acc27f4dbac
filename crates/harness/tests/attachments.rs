use std::sync::Arc;

use revdb_core::{AttachmentChanges, BlobHash, Encoding, UnsavedAttachment};
use revdb_engine::EngineError;
use revdb_harness::TestStore;
use revdb_storage::MemoryBlobStore;

fn text(name: &str, data: &[u8]) -> UnsavedAttachment {
    UnsavedAttachment::plain(name, "text/plain", data.to_vec())
}

#[test]
fn create_stores_blob_and_metadata() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestStore::new()?;
    let rev = t.store.create(Some("d"), "{}", vec![text("a.txt", b"alpha")])?;

    assert_eq!(rev.attachments.len(), 1);
    let meta = &rev.attachments[0];
    assert_eq!(meta.name, "a.txt");
    assert_eq!(meta.length, 5);
    assert_eq!(meta.encoded_length, 5);
    assert_eq!(meta.revpos, 1);
    assert_eq!(meta.digest, BlobHash::from_bytes(*blake3::hash(b"alpha").as_bytes()));

    let (_, data) = t.store.attachment("d", &rev.rev_id, "a.txt")?;
    assert_eq!(data, b"alpha");
    Ok(())
}

#[test]
fn update_carries_attachments_forward_without_rewriting() -> Result<(), Box<dyn std::error::Error>> {
    let blobs = Arc::new(MemoryBlobStore::new());
    let t = TestStore::with_blob_store(blobs.clone())?;
    let r1 = t
        .store
        .create(Some("d"), "{}", vec![text("a.txt", b"alpha"), text("b.txt", b"beta")])?;
    assert_eq!(blobs.len(), 2);

    let r2 = t
        .store
        .update("d", &r1.rev_id, r#"{"v":2}"#, AttachmentChanges::none())?;
    assert_eq!(blobs.len(), 2);
    assert_eq!(r2.attachments, r1.attachments);
    assert!(r2.attachments.iter().all(|a| a.revpos == 1));
    Ok(())
}

#[test]
fn update_replaces_and_removes_attachments() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestStore::new()?;
    let r1 = t
        .store
        .create(Some("d"), "{}", vec![text("keep", b"k"), text("swap", b"old"), text("drop", b"d")])?;

    let changes = AttachmentChanges::none()
        .put(text("swap", b"new"))
        .put(text("add", b"added"))
        .remove("drop");
    let r2 = t.store.update("d", &r1.rev_id, "{}", changes)?;

    let names: Vec<&str> = r2.attachments.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["add", "keep", "swap"]);
    assert_eq!(r2.attachment("keep").map(|a| a.revpos), Some(1));
    assert_eq!(r2.attachment("swap").map(|a| a.revpos), Some(2));
    assert_eq!(t.store.attachment("d", &r2.rev_id, "swap")?.1, b"new");

    // The parent revision keeps its own set.
    assert_eq!(t.store.attachment("d", &r1.rev_id, "swap")?.1, b"old");
    assert!(matches!(
        t.store.attachment("d", &r2.rev_id, "drop"),
        Err(EngineError::NotFound(_))
    ));
    Ok(())
}

#[test]
fn attachments_change_the_revision_id() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestStore::new()?;
    let plain = t.store.create(Some("a"), "{}", vec![])?;
    let with = t.store.create(Some("b"), "{}", vec![text("f", b"1")])?;
    let other = t.store.create(Some("c"), "{}", vec![text("f", b"2")])?;
    let same = t.store.create(Some("e"), "{}", vec![text("f", b"2")])?;
    assert_ne!(plain.rev_id, with.rev_id);
    assert_ne!(with.rev_id, other.rev_id);
    assert_eq!(other.rev_id, same.rev_id);
    Ok(())
}

#[test]
fn removing_a_missing_attachment_fails_cleanly() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestStore::new()?;
    let r1 = t.store.create(Some("d"), "{}", vec![])?;
    let err = t
        .store
        .update("d", &r1.rev_id, "{}", AttachmentChanges::none().remove("ghost"))
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    assert_eq!(t.winner("d")?.rev_id, r1.rev_id);
    Ok(())
}

#[test]
fn duplicate_names_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestStore::new()?;
    let err = t
        .store
        .create(Some("d"), "{}", vec![text("x", b"1"), text("x", b"2")])
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    assert!(!t.store.contains("d")?);
    Ok(())
}

#[test]
fn encoded_attachments_keep_both_lengths() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestStore::new()?;
    let compressed = vec![0x1f, 0x8b, 0x08, 0x00];
    let rev = t.store.create(
        Some("d"),
        "{}",
        vec![UnsavedAttachment::encoded("log", "text/plain", Encoding::Gzip, 1000, compressed.clone())],
    )?;
    let (meta, data) = t.store.attachment("d", &rev.rev_id, "log")?;
    assert_eq!(meta.encoding, Encoding::Gzip);
    assert_eq!(meta.length, 1000);
    assert_eq!(meta.encoded_length, 4);
    assert_eq!(data, compressed);
    Ok(())
}

#[test]
fn file_backed_blobs_are_content_addressed() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestStore::on_disk()?;
    let r1 = t.store.create(Some("a"), "{}", vec![text("f", b"shared")])?;
    t.store.create(Some("b"), "{}", vec![text("g", b"shared")])?;
    t.store.update("a", &r1.rev_id, r#"{"v":2}"#, AttachmentChanges::none())?;

    let dir = t.dir().ok_or("on-disk store has a directory")?.join("attachments");
    let files = std::fs::read_dir(dir)?.count();
    assert_eq!(files, 1);
    Ok(())
}
