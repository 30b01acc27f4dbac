use std::path::Path;

use rusqlite::{Connection, OptionalExtension};

use revdb_core::{
    elect_winner, Attachment, BlobHash, ChangeEvent, DocNumericId, DocumentRevision, Encoding,
    Leaf, RevId, Sequence, WinnerRef,
};

use crate::error::StorageError;
use crate::schema::{init_schema, StorageOptions};
use crate::traits::{Changes, InsertOutcome, LocalDocument, NewRevision, RevisionStore};

const REV_COLS: &str = "revs.sequence, revs.doc_id, docs.docid, revs.parent, revs.current, \
                        revs.deleted, revs.available, revs.revid, revs.json";

/// The single connection a store's writer owns, plus its transaction state.
pub struct SqliteStorage {
    pub(crate) conn: Connection,
    pub(crate) tx_stack: Vec<bool>,
    pub(crate) nested_set_success: bool,
    pub(crate) staged_events: Vec<ChangeEvent>,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>, options: &StorageOptions) -> Result<Self, StorageError> {
        let conn = Connection::open(path.as_ref())?;
        init_schema(&conn, options, true)?;
        tracing::info!(path = %path.as_ref().display(), "opened revision store");
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn, &StorageOptions::default(), false)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            tx_stack: Vec::new(),
            nested_set_success: false,
            staged_events: Vec::new(),
        }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Rebuild the database file, reclaiming free pages.
    pub fn vacuum(&self) -> Result<(), StorageError> {
        if self.is_in_transaction() {
            return Err(StorageError::TransactionState(
                "cannot VACUUM inside a transaction".into(),
            ));
        }
        self.conn.execute_batch("VACUUM")?;
        Ok(())
    }

    fn query_revisions(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<DocumentRevision>, StorageError> {
        let mut stmt = self.conn.prepare(sql)?;
        let raws = stmt
            .query_map(params, RawRevision::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter()
            .map(|raw| {
                let attachments = self.attachments_for(Sequence::new(raw.sequence))?;
                raw.into_revision(attachments)
            })
            .collect()
    }

    fn query_revision(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Option<DocumentRevision>, StorageError> {
        Ok(self.query_revisions(sql, params)?.into_iter().next())
    }
}

/// Revision columns as read from SQLite, before the rev id is parsed.
struct RawRevision {
    sequence: i64,
    doc_numeric_id: i64,
    doc_id: String,
    parent: Option<i64>,
    current: bool,
    deleted: bool,
    available: bool,
    rev_id: String,
    body: Vec<u8>,
}

impl RawRevision {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            sequence: row.get(0)?,
            doc_numeric_id: row.get(1)?,
            doc_id: row.get(2)?,
            parent: row.get(3)?,
            current: row.get(4)?,
            deleted: row.get(5)?,
            available: row.get(6)?,
            rev_id: row.get(7)?,
            body: row.get(8)?,
        })
    }

    fn into_revision(self, attachments: Vec<Attachment>) -> Result<DocumentRevision, StorageError> {
        Ok(DocumentRevision {
            doc_id: self.doc_id,
            doc_numeric_id: DocNumericId::new(self.doc_numeric_id),
            rev_id: RevId::parse(&self.rev_id)?,
            sequence: Sequence::new(self.sequence),
            parent_sequence: self.parent.map(Sequence::new),
            deleted: self.deleted,
            current: self.current,
            available: self.available,
            body: self.body,
            attachments,
        })
    }
}

impl RevisionStore for SqliteStorage {
    fn doc_numeric_id(&self, doc_id: &str) -> Result<Option<DocNumericId>, StorageError> {
        let id: Option<i64> = self
            .conn
            .query_row("SELECT doc_id FROM docs WHERE docid = ?1", [doc_id], |row| row.get(0))
            .optional()?;
        Ok(id.map(DocNumericId::new))
    }

    fn insert_document(&mut self, doc_id: &str) -> Result<DocNumericId, StorageError> {
        let result = self
            .conn
            .execute("INSERT INTO docs (docid) VALUES (?1)", [doc_id]);
        match result {
            Ok(_) => Ok(DocNumericId::new(self.conn.last_insert_rowid())),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::DocumentCollision {
                    doc_id: doc_id.to_string(),
                })
            }
            Err(e) => Err(StorageError::Sqlite(e)),
        }
    }

    fn document_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM revs WHERE current = 1 AND deleted = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn insert_revision(&mut self, rev: &NewRevision<'_>) -> Result<InsertOutcome, StorageError> {
        if let Some(existing) = self.revision_sequence(rev.doc_numeric_id, rev.rev_id)? {
            return Ok(InsertOutcome::Existing(existing));
        }

        if let Some(parent) = rev.parent {
            let parent_doc: Option<i64> = self
                .conn
                .query_row(
                    "SELECT doc_id FROM revs WHERE sequence = ?1",
                    [parent.get()],
                    |row| row.get(0),
                )
                .optional()?;
            if parent_doc != Some(rev.doc_numeric_id.get()) {
                return Err(StorageError::ConstraintViolation(format!(
                    "parent {parent} of {} does not belong to document {}",
                    rev.rev_id, rev.doc_numeric_id
                )));
            }
        }

        self.conn.execute(
            "INSERT INTO revs (doc_id, parent, current, deleted, available, revid, json) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                rev.doc_numeric_id.get(),
                rev.parent.map(|p| p.get()),
                rev.current,
                rev.deleted,
                rev.available,
                rev.rev_id.to_string(),
                rev.body,
            ],
        )?;
        Ok(InsertOutcome::Inserted(Sequence::new(
            self.conn.last_insert_rowid(),
        )))
    }

    fn set_current(&mut self, sequence: Sequence, current: bool) -> Result<(), StorageError> {
        let updated = self.conn.execute(
            "UPDATE revs SET current = ?1 WHERE sequence = ?2",
            rusqlite::params![current, sequence.get()],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("revision sequence {sequence}")));
        }
        Ok(())
    }

    fn revision_sequence(
        &self,
        doc_numeric_id: DocNumericId,
        rev_id: &RevId,
    ) -> Result<Option<Sequence>, StorageError> {
        let seq: Option<i64> = self
            .conn
            .query_row(
                "SELECT sequence FROM revs WHERE doc_id = ?1 AND revid = ?2",
                rusqlite::params![doc_numeric_id.get(), rev_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(seq.map(Sequence::new))
    }

    fn get_revision(
        &self,
        doc_id: &str,
        rev_id: &RevId,
    ) -> Result<Option<DocumentRevision>, StorageError> {
        let sql = format!(
            "SELECT {REV_COLS} FROM revs JOIN docs ON revs.doc_id = docs.doc_id WHERE docs.docid = ?1 AND revs.revid = ?2"
        );
        self.query_revision(&sql, rusqlite::params![doc_id, rev_id.to_string()])
    }

    fn get_by_sequence(&self, sequence: Sequence) -> Result<Option<DocumentRevision>, StorageError> {
        let sql = format!(
            "SELECT {REV_COLS} FROM revs JOIN docs ON revs.doc_id = docs.doc_id WHERE revs.sequence = ?1"
        );
        self.query_revision(&sql, rusqlite::params![sequence.get()])
    }

    fn current_revision(&self, doc_id: &str) -> Result<Option<DocumentRevision>, StorageError> {
        let sql = format!(
            "SELECT {REV_COLS} FROM revs JOIN docs ON revs.doc_id = docs.doc_id WHERE docs.docid = ?1 AND revs.current = 1"
        );
        self.query_revision(&sql, rusqlite::params![doc_id])
    }

    fn current_winner(&self, doc_numeric_id: DocNumericId) -> Result<Option<WinnerRef>, StorageError> {
        let row: Option<(i64, String, bool)> = self
            .conn
            .query_row(
                "SELECT sequence, revid, deleted FROM revs WHERE doc_id = ?1 AND current = 1",
                [doc_numeric_id.get()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        match row {
            Some((sequence, rev_id, deleted)) => Ok(Some(WinnerRef {
                rev_id: RevId::parse(&rev_id)?,
                sequence: Sequence::new(sequence),
                deleted,
            })),
            None => Ok(None),
        }
    }

    fn is_leaf(&self, sequence: Sequence) -> Result<bool, StorageError> {
        let has_child: bool = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM revs WHERE parent = ?1)",
            [sequence.get()],
            |row| row.get(0),
        )?;
        Ok(!has_child)
    }

    fn leaves(&self, doc_numeric_id: DocNumericId) -> Result<Vec<Leaf>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT sequence, revid, deleted FROM revs WHERE doc_id = ?1 \
             AND NOT EXISTS (SELECT 1 FROM revs c WHERE c.parent = revs.sequence) \
             ORDER BY sequence",
        )?;
        let rows = stmt
            .query_map([doc_numeric_id.get()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, bool>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = Vec::with_capacity(rows.len());
        for (sequence, rev_id, deleted) in rows {
            result.push(Leaf::new(Sequence::new(sequence), RevId::parse(&rev_id)?, deleted));
        }
        Ok(result)
    }

    fn leaf_revisions(&self, doc_id: &str) -> Result<Vec<DocumentRevision>, StorageError> {
        let sql = format!(
            "SELECT {REV_COLS} FROM revs JOIN docs ON revs.doc_id = docs.doc_id WHERE docs.docid = ?1 \
             AND NOT EXISTS (SELECT 1 FROM revs c WHERE c.parent = revs.sequence) \
             ORDER BY revs.sequence"
        );
        self.query_revisions(&sql, rusqlite::params![doc_id])
    }

    fn pick_winner(&mut self, doc_numeric_id: DocNumericId) -> Result<Option<WinnerRef>, StorageError> {
        let leaves = self.leaves(doc_numeric_id)?;
        let Some(winner) = elect_winner(&leaves).cloned() else {
            return Ok(None);
        };

        // Clear the old winner before setting the new one.
        self.conn.execute(
            "UPDATE revs SET current = 0 WHERE doc_id = ?1 AND current = 1 AND sequence != ?2",
            rusqlite::params![doc_numeric_id.get(), winner.sequence.get()],
        )?;
        self.conn.execute(
            "UPDATE revs SET current = 1 WHERE sequence = ?1",
            [winner.sequence.get()],
        )?;

        Ok(Some(WinnerRef {
            rev_id: winner.rev_id,
            sequence: winner.sequence,
            deleted: winner.deleted,
        }))
    }

    fn revision_history(&self, doc_id: &str, rev_id: &RevId) -> Result<Vec<RevId>, StorageError> {
        let Some(doc) = self.doc_numeric_id(doc_id)? else {
            return Err(StorageError::NotFound(format!("document {doc_id}")));
        };
        let Some(start) = self.revision_sequence(doc, rev_id)? else {
            return Err(StorageError::NotFound(format!("revision {doc_id}@{rev_id}")));
        };

        let mut stmt = self.conn.prepare(
            "WITH RECURSIVE chain(sequence, parent, revid, depth) AS (
                SELECT sequence, parent, revid, 0 FROM revs WHERE sequence = ?1
                UNION ALL
                SELECT r.sequence, r.parent, r.revid, c.depth + 1
                FROM revs r JOIN chain c ON r.sequence = c.parent
            )
            SELECT revid FROM chain ORDER BY depth DESC",
        )?;
        let ids = stmt
            .query_map([start.get()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids.iter()
            .map(|s| RevId::parse(s).map_err(StorageError::from))
            .collect()
    }

    fn changes(&self, since: Sequence, limit: usize) -> Result<Changes, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT doc_id, MAX(sequence) AS last FROM revs WHERE sequence > ?1 \
             GROUP BY doc_id ORDER BY last LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![since.get(), limit as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let sql = format!(
            "SELECT {REV_COLS} FROM revs JOIN docs ON revs.doc_id = docs.doc_id WHERE revs.doc_id = ?1 AND revs.current = 1"
        );
        let mut results = Vec::with_capacity(rows.len());
        let mut last_sequence = since;
        for (doc_numeric_id, last) in rows {
            if let Some(rev) = self.query_revision(&sql, rusqlite::params![doc_numeric_id])? {
                results.push(rev);
            }
            last_sequence = last_sequence.max(Sequence::new(last));
        }
        Ok(Changes {
            results,
            last_sequence,
        })
    }

    fn conflicted_ids(&self) -> Result<Vec<String>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT docs.docid FROM docs JOIN revs ON revs.doc_id = docs.doc_id \
             WHERE revs.deleted = 0 \
             AND NOT EXISTS (SELECT 1 FROM revs c WHERE c.parent = revs.sequence) \
             GROUP BY docs.doc_id HAVING COUNT(*) > 1 ORDER BY docs.docid",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn last_sequence(&self) -> Result<Sequence, StorageError> {
        let seq: i64 =
            self.conn
                .query_row("SELECT COALESCE(MAX(sequence), 0) FROM revs", [], |row| row.get(0))?;
        Ok(Sequence::new(seq))
    }

    fn insert_attachment(
        &mut self,
        sequence: Sequence,
        attachment: &Attachment,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO attachments (sequence, filename, key, type, encoding, length, encoded_length, revpos) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                sequence.get(),
                attachment.name,
                attachment.digest.to_hex(),
                attachment.content_type,
                attachment.encoding.as_str(),
                attachment.length as i64,
                attachment.encoded_length as i64,
                attachment.revpos as i64,
            ],
        )?;
        Ok(())
    }

    fn copy_attachments(
        &mut self,
        from: Sequence,
        to: Sequence,
        skip: &[&str],
    ) -> Result<usize, StorageError> {
        let mut copied = 0;
        for attachment in self.attachments_for(from)? {
            if skip.contains(&attachment.name.as_str()) {
                continue;
            }
            self.insert_attachment(to, &attachment)?;
            copied += 1;
        }
        Ok(copied)
    }

    fn attachments_for(&self, sequence: Sequence) -> Result<Vec<Attachment>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT filename, key, type, encoding, length, encoded_length, revpos FROM attachments WHERE sequence = ?1 ORDER BY filename",
        )?;
        let rows = stmt
            .query_map([sequence.get()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = Vec::with_capacity(rows.len());
        for (name, key, content_type, encoding, length, encoded_length, revpos) in rows {
            result.push(Attachment {
                name,
                content_type,
                encoding: Encoding::parse(&encoding)?,
                length: length as u64,
                encoded_length: encoded_length as u64,
                digest: BlobHash::from_hex(&key)?,
                revpos: revpos as u64,
            });
        }
        Ok(result)
    }

    fn put_local(&mut self, doc_id: &str, body: &[u8]) -> Result<LocalDocument, StorageError> {
        let generation = match self.get_local(doc_id)? {
            Some(existing) => existing.rev_id.generation() + 1,
            None => 1,
        };
        let rev_id = RevId::new(generation, "local")?;
        self.conn.execute(
            "INSERT INTO localdocs (docid, revid, json) VALUES (?1, ?2, ?3)
             ON CONFLICT(docid) DO UPDATE SET revid = excluded.revid, json = excluded.json",
            rusqlite::params![doc_id, rev_id.to_string(), body],
        )?;
        Ok(LocalDocument {
            doc_id: doc_id.to_string(),
            rev_id,
            body: body.to_vec(),
        })
    }

    fn get_local(&self, doc_id: &str) -> Result<Option<LocalDocument>, StorageError> {
        let row: Option<(String, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT revid, json FROM localdocs WHERE docid = ?1",
                [doc_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            Some((rev_id, body)) => Ok(Some(LocalDocument {
                doc_id: doc_id.to_string(),
                rev_id: RevId::parse(&rev_id)?,
                body,
            })),
            None => Ok(None),
        }
    }

    fn delete_local(&mut self, doc_id: &str) -> Result<bool, StorageError> {
        let deleted = self
            .conn
            .execute("DELETE FROM localdocs WHERE docid = ?1", [doc_id])?;
        Ok(deleted > 0)
    }
}
