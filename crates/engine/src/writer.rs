use std::sync::Arc;

use revdb_storage::{BlobStore, SqliteStorage, TxOutcome};

use crate::error::EngineError;
use crate::feed::ChangeFeed;

/// State owned by the writer thread. Every command runs against it, one at a
/// time, so nothing else ever touches the connection.
pub struct Writer {
    storage: SqliteStorage,
    blobs: Arc<dyn BlobStore>,
    feed: Arc<ChangeFeed>,
}

impl Writer {
    pub(crate) fn new(storage: SqliteStorage, blobs: Arc<dyn BlobStore>, feed: Arc<ChangeFeed>) -> Self {
        Self {
            storage,
            blobs,
            feed,
        }
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut SqliteStorage {
        &mut self.storage
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.blobs.as_ref()
    }

    /// Run `f` as one level of a nested transaction.
    ///
    /// The level is marked successful when `f` returns `Ok`. Only the
    /// outermost level commits, and only if no level failed; staged change
    /// events are published after that commit.
    pub fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        self.storage.begin()?;
        let result = f(self);
        if result.is_ok() {
            self.storage.mark_successful()?;
        }

        match (result, self.storage.end()) {
            (Ok(value), Ok(TxOutcome::Nested)) => Ok(value),
            (Ok(value), Ok(TxOutcome::Committed(events))) => {
                self.feed.publish(events);
                Ok(value)
            }
            (Ok(_), Ok(TxOutcome::RolledBack)) => {
                tracing::warn!("nested level failed, transaction rolled back");
                Err(EngineError::TransactionAborted)
            }
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), outcome) => {
                if matches!(outcome, Ok(TxOutcome::RolledBack)) {
                    tracing::warn!(error = %e, "transaction rolled back");
                }
                Err(e)
            }
        }
    }

    /// Recover after a command panicked partway through a transaction.
    pub(crate) fn abandon(&mut self) {
        if let Err(e) = self.storage.abandon_transaction() {
            tracing::error!(error = %e, "failed to roll back abandoned transaction");
        }
    }
}
