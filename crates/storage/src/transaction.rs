//! Nested transactions over the writer's single connection.
//!
//! Each `begin` pushes a level onto a stack, initially unsuccessful. The first
//! level opens a physical `BEGIN EXCLUSIVE`. When the last level ends, the
//! whole group commits only if every level was marked successful; one failed
//! level rolls back everything, including work done by outer levels.

use revdb_core::ChangeEvent;

use crate::error::StorageError;
use crate::sqlite::SqliteStorage;

/// What `end` did to the physical transaction.
#[derive(Debug, PartialEq, Eq)]
pub enum TxOutcome {
    /// An inner level closed; the physical transaction is still open.
    Nested,
    /// The outermost level committed. Carries the events staged by the group,
    /// in the order they were staged.
    Committed(Vec<ChangeEvent>),
    /// The outermost level rolled back because some level failed.
    RolledBack,
}

impl SqliteStorage {
    pub fn begin(&mut self) -> Result<(), StorageError> {
        if self.tx_stack.is_empty() {
            self.conn.execute_batch("BEGIN EXCLUSIVE")?;
            self.nested_set_success = true;
            self.staged_events.clear();
        }
        self.tx_stack.push(false);
        Ok(())
    }

    pub fn mark_successful(&mut self) -> Result<(), StorageError> {
        match self.tx_stack.last_mut() {
            Some(top) => {
                *top = true;
                Ok(())
            }
            None => Err(StorageError::TransactionState(
                "mark_successful called outside a transaction".into(),
            )),
        }
    }

    pub fn end(&mut self) -> Result<TxOutcome, StorageError> {
        let success = self.tx_stack.pop().ok_or_else(|| {
            StorageError::TransactionState("end called without a matching begin".into())
        })?;
        if !success {
            self.nested_set_success = false;
        }
        if !self.tx_stack.is_empty() {
            return Ok(TxOutcome::Nested);
        }

        let events = std::mem::take(&mut self.staged_events);
        if !self.nested_set_success {
            self.rollback()?;
            return Ok(TxOutcome::RolledBack);
        }

        if let Err(e) = self.conn.execute_batch("COMMIT") {
            tracing::warn!(error = %e, "commit failed, rolling back");
            self.rollback()?;
            return Err(StorageError::Sqlite(e));
        }
        Ok(TxOutcome::Committed(events))
    }

    /// Run `f` as one nesting level: begin, mark successful if `f` returns
    /// `Ok`, then end.
    pub fn in_transaction<T, E>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<(T, TxOutcome), E>
    where
        E: From<StorageError>,
    {
        self.begin()?;
        let result = f(self);
        if result.is_ok() {
            self.mark_successful()?;
        }
        let outcome = self.end();
        match (result, outcome) {
            (Ok(value), Ok(outcome)) => Ok((value, outcome)),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e.into()),
        }
    }

    pub fn transaction_depth(&self) -> usize {
        self.tx_stack.len()
    }

    pub fn is_in_transaction(&self) -> bool {
        !self.tx_stack.is_empty()
    }

    /// Queue an event for delivery once the outermost level commits.
    pub fn stage_event(&mut self, event: ChangeEvent) {
        self.staged_events.push(event);
    }

    /// Drop all nesting levels and roll back. Used to recover the writer after
    /// a command panicked mid-transaction.
    pub fn abandon_transaction(&mut self) -> Result<(), StorageError> {
        if self.tx_stack.is_empty() {
            return Ok(());
        }
        self.tx_stack.clear();
        self.staged_events.clear();
        self.nested_set_success = false;
        self.rollback()
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK").map_err(|e| {
            tracing::warn!(error = %e, "rollback failed, database is probably malfunctioning");
            StorageError::Sqlite(e)
        })
    }
}
