use revdb_core::RevId;
use revdb_engine::{Command, CreateDocument, DeleteDocument, EngineError, ForceInsert, Writer};
use revdb_harness::TestStore;
use revdb_storage::StorageError;
use serde_json::json;

fn rev(id: &str) -> RevId {
    RevId::parse(id).unwrap()
}

fn conflicted(t: &TestStore) -> Result<(), EngineError> {
    let histories: [&[&str]; 3] = [
        &["1-a", "2-a", "3-aaa"],
        &["1-a", "2-a", "3-zzz"],
        &["1-a", "2-a", "3-ccc", "4-bbb"],
    ];
    for history in histories {
        let history = history.iter().map(|id| rev(id)).collect();
        t.store.force_insert(ForceInsert::new("d", history).with_body("{}"))?;
    }
    Ok(())
}

fn live_leaves(t: &TestStore, doc_id: &str) -> Result<usize, EngineError> {
    Ok(t.store.leaves(doc_id)?.iter().filter(|l| !l.deleted).count())
}

// ============================================================================
// Delete-all-leaves
// ============================================================================

#[test]
fn delete_all_leaves_tombstones_every_live_leaf() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestStore::new()?;
    conflicted(&t)?;

    let tombstones = t.store.delete_all_leaves("d")?;
    assert_eq!(tombstones.len(), 3);
    assert!(tombstones.iter().all(|r| r.deleted));
    assert_eq!(live_leaves(&t, "d")?, 0);

    // With only tombstones left, the deepest one wins.
    let winner = t.winner("d")?;
    assert!(winner.deleted);
    assert_eq!(winner.generation(), 5);
    assert_eq!(t.current_flags("d")?, 1);
    assert!(!t.store.contains("d")?);
    assert_eq!(t.store.document_count()?, 0);
    Ok(())
}

#[test]
fn delete_all_leaves_of_unknown_or_deleted_document_is_empty() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestStore::new()?;
    assert!(t.store.delete_all_leaves("nobody")?.is_empty());

    let r1 = t.create_json("x", json!({}))?;
    t.store.delete("x", &r1.rev_id)?;
    assert!(t.store.delete_all_leaves("x")?.is_empty());
    Ok(())
}

#[test]
fn failing_delete_rolls_back_the_whole_group() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestStore::new()?;
    conflicted(&t)?;
    let before = t.store.last_sequence()?;
    let events = t.store.subscribe();

    let err = t
        .store
        .execute(|w: &mut Writer| -> Result<(), EngineError> {
            w.transact(|w| {
                DeleteDocument::new("d", rev("3-aaa")).execute(w)?;
                DeleteDocument::new("d", rev("3-zzz")).execute(w)?;
                DeleteDocument::new("d", rev("9-missing")).execute(w)?;
                Ok(())
            })
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    assert_eq!(live_leaves(&t, "d")?, 3);
    assert_eq!(t.store.last_sequence()?, before);
    assert!(events.try_recv().is_err());
    Ok(())
}

#[test]
fn delete_all_leaves_is_undone_when_a_later_tombstone_fails() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestStore::new()?;
    conflicted(&t)?;
    let leaves = t.store.leaves("d")?;
    assert_eq!(leaves.len(), 3);

    // Leaves are tombstoned in sequence order, so the last one fails after
    // the first two deletions have already been written.
    let last = leaves[leaves.len() - 1].sequence.get();
    t.store.execute(move |w: &mut Writer| -> Result<(), EngineError> {
        w.storage()
            .conn()
            .execute_batch(&format!(
                "CREATE TRIGGER refuse_tombstone BEFORE INSERT ON revs \
                 WHEN NEW.parent = {last} \
                 BEGIN SELECT RAISE(ABORT, 'tombstone refused'); END;"
            ))
            .map_err(StorageError::from)?;
        Ok(())
    })?;

    let before = t.store.last_sequence()?;
    let winner_before = t.winner("d")?.rev_id;
    let events = t.store.subscribe();

    assert!(t.store.delete_all_leaves("d").is_err());

    assert_eq!(live_leaves(&t, "d")?, 3);
    assert_eq!(t.store.leaves("d")?, leaves);
    assert_eq!(t.store.last_sequence()?, before);
    assert_eq!(t.winner("d")?.rev_id, winner_before);
    assert_eq!(t.current_flags("d")?, 1);
    assert!(events.try_recv().is_err());
    Ok(())
}

#[test]
fn swallowed_inner_failure_still_aborts() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestStore::new()?;
    conflicted(&t)?;

    let err = t
        .store
        .execute(|w: &mut Writer| -> Result<(), EngineError> {
            w.transact(|w| {
                DeleteDocument::new("d", rev("3-aaa")).execute(w)?;
                let inner = DeleteDocument::new("d", rev("2-a")).execute(w);
                assert!(matches!(inner, Err(EngineError::Conflict(_))));
                Ok(())
            })
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::TransactionAborted));
    assert!(!err.is_recoverable());
    assert_eq!(live_leaves(&t, "d")?, 3);
    Ok(())
}

#[test]
fn nested_commands_commit_together() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestStore::new()?;
    let events = t.store.subscribe();

    let (a, b) = t.store.execute(|w: &mut Writer| -> Result<_, EngineError> {
        w.transact(|w| {
            let a = CreateDocument::new(Some("a".into()), r#"{"n":1}"#).execute(w)?;
            assert_eq!(w.storage().transaction_depth(), 1);
            let b = CreateDocument::new(Some("b".into()), r#"{"n":2}"#).execute(w)?;
            Ok((a, b))
        })
    })?;
    assert_eq!(a.doc_id, "a");
    assert_eq!(b.doc_id, "b");

    let delivered: Vec<String> = events.try_iter().map(|e| e.doc_id).collect();
    assert_eq!(delivered, vec!["a", "b"]);
    assert_eq!(t.store.document_count()?, 2);
    Ok(())
}

#[test]
fn writer_is_idle_between_commands() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestStore::new()?;
    let _ = t.create_json("dup", json!({}))?;
    assert!(t.create_json("dup", json!({})).is_err());
    let depth = t
        .store
        .execute(|w: &mut Writer| -> Result<usize, EngineError> { Ok(w.storage().transaction_depth()) })?;
    assert_eq!(depth, 0);
    Ok(())
}
