use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

/// Connection tuning applied when a store is opened.
#[derive(Debug, Clone)]
pub struct StorageOptions {
    pub busy_timeout_ms: u64,
    pub cache_size_kib: i64,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
            cache_size_kib: 32000,
        }
    }
}

pub fn init_schema(
    conn: &Connection,
    options: &StorageOptions,
    on_disk: bool,
) -> Result<(), StorageError> {
    if on_disk {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    }
    conn.execute_batch(&format!(
        "
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA cache_size = -{};
        PRAGMA busy_timeout = {};
    ",
        options.cache_size_kib, options.busy_timeout_ms
    ))?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS docs (
    doc_id INTEGER PRIMARY KEY,
    docid TEXT NOT NULL UNIQUE CHECK (length(docid) > 0)
);

CREATE TABLE IF NOT EXISTS revs (
    sequence INTEGER PRIMARY KEY AUTOINCREMENT,
    doc_id INTEGER NOT NULL REFERENCES docs (doc_id),
    parent INTEGER REFERENCES revs (sequence),
    current INTEGER NOT NULL DEFAULT 0 CHECK (current IN (0, 1)),
    deleted INTEGER NOT NULL DEFAULT 0 CHECK (deleted IN (0, 1)),
    available INTEGER NOT NULL DEFAULT 1 CHECK (available IN (0, 1)),
    revid TEXT NOT NULL,
    json BLOB NOT NULL,
    UNIQUE (doc_id, revid)
);
CREATE INDEX IF NOT EXISTS idx_revs_doc_current ON revs (doc_id, current);
CREATE INDEX IF NOT EXISTS idx_revs_parent ON revs (parent);

CREATE TABLE IF NOT EXISTS attachments (
    sequence INTEGER NOT NULL REFERENCES revs (sequence),
    filename TEXT NOT NULL,
    key TEXT NOT NULL CHECK (length(key) = 64),
    type TEXT NOT NULL,
    encoding TEXT NOT NULL,
    length INTEGER NOT NULL,
    encoded_length INTEGER NOT NULL,
    revpos INTEGER NOT NULL,
    PRIMARY KEY (sequence, filename)
);

CREATE TABLE IF NOT EXISTS localdocs (
    docid TEXT PRIMARY KEY,
    revid TEXT NOT NULL,
    json BLOB NOT NULL
);
";
