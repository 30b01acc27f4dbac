use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("document collision: {doc_id}")]
    DocumentCollision { doc_id: String },

    #[error("transaction state: {0}")]
    TransactionState(String),

    #[error("core error: {0}")]
    Core(#[from] revdb_core::CoreError),
}
