use std::sync::Arc;
use std::thread;

use revdb_core::AttachmentChanges;
use revdb_engine::{EngineError, UpdateDocument};
use revdb_harness::TestStore;
use serde_json::json;

#[test]
fn concurrent_updates_of_the_same_revision_conflict() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestStore::new()?;
    let r1 = t.create_json("D", json!({"x": 0}))?;

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = ["A", "B"]
            .into_iter()
            .map(|body| {
                let store = &t.store;
                let expected = r1.rev_id.clone();
                s.spawn(move || {
                    store.update(
                        "D",
                        &expected,
                        json!({"x": body}).to_string(),
                        AttachmentChanges::none(),
                    )
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let ok: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(ok.len(), 1);
    assert_eq!(ok[0].generation(), 2);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(EngineError::Conflict(_)))));

    assert_eq!(t.winner("D")?.rev_id, ok[0].rev_id);
    assert_eq!(t.store.leaves("D")?.len(), 1);
    Ok(())
}

#[test]
fn submitted_commands_conflict_in_queue_order() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestStore::new()?;
    let r1 = t.create_json("D", json!({}))?;

    let first = t
        .store
        .submit(UpdateDocument::new("D", r1.rev_id.clone(), r#"{"n":1}"#))?;
    let second = t
        .store
        .submit(UpdateDocument::new("D", r1.rev_id.clone(), r#"{"n":2}"#))?;

    let winner = first.wait()?;
    assert!(matches!(second.wait(), Err(EngineError::Conflict(_))));
    assert_eq!(t.winner("D")?.rev_id, winner.rev_id);
    Ok(())
}

#[test]
fn retrying_writers_keep_a_single_winner() -> Result<(), Box<dyn std::error::Error>> {
    const THREADS: usize = 8;
    const EDITS: usize = 20;

    let t = Arc::new(TestStore::new()?);
    for doc in ["p", "q"] {
        t.create_json(doc, json!({"count": 0}))?;
    }

    thread::scope(|s| {
        for worker in 0..THREADS {
            let t = Arc::clone(&t);
            s.spawn(move || {
                let doc = if worker % 2 == 0 { "p" } else { "q" };
                let mut done = 0;
                while done < EDITS {
                    let current = t.winner(doc).unwrap();
                    let count = current.body_json().unwrap()["count"].as_u64().unwrap();
                    match t.update_json(doc, &current.rev_id, json!({"count": count + 1})) {
                        Ok(_) => done += 1,
                        Err(EngineError::Conflict(_)) => continue,
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            });
        }
    });

    for doc in ["p", "q"] {
        let winner = t.winner(doc)?;
        let edits = (THREADS / 2 * EDITS) as u64;
        assert_eq!(winner.generation(), edits + 1);
        assert_eq!(winner.body_json()?, json!({"count": edits}));
        assert_eq!(t.current_flags(doc)?, 1);
        assert_eq!(t.store.leaves(doc)?.len(), 1);
    }
    Ok(())
}

#[test]
fn events_arrive_in_commit_order() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestStore::new()?;
    let events = t.store.subscribe();

    thread::scope(|s| {
        for worker in 0..4 {
            let store = &t.store;
            s.spawn(move || {
                for i in 0..10 {
                    let doc_id = format!("w{worker}-{i}");
                    store.create(Some(doc_id.as_str()), "{}", vec![]).unwrap();
                }
            });
        }
    });

    let sequences: Vec<i64> = events
        .try_iter()
        .filter_map(|e| e.new_winner.map(|w| w.sequence.get()))
        .collect();
    assert_eq!(sequences.len(), 40);
    assert!(sequences.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(t.store.document_count()?, 40);
    Ok(())
}
