use revdb_core::{DocumentRevision, Sequence, UnsavedAttachment};
use revdb_engine::{EngineError, ForceInsert, Store};

use crate::TestStore;

/// What one replication pass moved.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplicationStats {
    pub documents: usize,
    pub inserted: usize,
    pub already_present: usize,
}

/// Push every leaf of every document in `from` into `to`.
///
/// Each leaf travels with its full ancestry and, when available, its body and
/// attachment bytes. Ancestors arrive as stubs on the receiving side.
pub fn replicate(from: &Store, to: &Store) -> Result<ReplicationStats, EngineError> {
    let mut stats = ReplicationStats::default();
    let mut since = Sequence::new(0);
    loop {
        let page = from.changes(since, 100)?;
        if page.results.is_empty() {
            break;
        }
        since = page.last_sequence;

        let mut items = Vec::new();
        for winner in &page.results {
            stats.documents += 1;
            for leaf in from.leaves(&winner.doc_id)? {
                items.push(outgoing(from, &leaf)?);
            }
        }
        let report = to.force_insert_all(items)?;
        stats.inserted += report.inserted.len();
        stats.already_present += report.already_present;
    }
    Ok(stats)
}

fn outgoing(from: &Store, leaf: &DocumentRevision) -> Result<ForceInsert, EngineError> {
    let history = from.revision_history(&leaf.doc_id, &leaf.rev_id)?;
    let mut item = ForceInsert::new(leaf.doc_id.clone(), history);
    item.deleted = leaf.deleted;
    if leaf.available {
        item.body = Some(leaf.body.clone());
        for attachment in &leaf.attachments {
            let data = from.blob_store().get(&attachment.digest)?;
            item.attachments.push(UnsavedAttachment::encoded(
                attachment.name.clone(),
                attachment.content_type.clone(),
                attachment.encoding,
                attachment.length,
                data,
            ));
        }
    }
    Ok(item)
}

/// A set of independent stores that replicate by explicit calls.
pub struct TestNetwork {
    stores: Vec<TestStore>,
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl TestNetwork {
    pub fn new() -> Self {
        Self { stores: Vec::new() }
    }

    pub fn with_stores(count: usize) -> Result<Self, EngineError> {
        let mut network = Self::new();
        for _ in 0..count {
            network.add_store()?;
        }
        Ok(network)
    }

    pub fn add_store(&mut self) -> Result<usize, EngineError> {
        let index = self.stores.len();
        self.stores.push(TestStore::new()?);
        Ok(index)
    }

    pub fn store(&self, index: usize) -> &TestStore {
        &self.stores[index]
    }

    pub fn replicate(&self, from: usize, to: usize) -> Result<ReplicationStats, EngineError> {
        replicate(&self.stores[from].store, &self.stores[to].store)
    }

    /// Replicate every ordered pair once.
    pub fn sync_all(&self) -> Result<(), EngineError> {
        for from in 0..self.stores.len() {
            for to in 0..self.stores.len() {
                if from != to {
                    self.replicate(from, to)?;
                }
            }
        }
        Ok(())
    }
}
