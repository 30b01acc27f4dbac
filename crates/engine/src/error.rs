use revdb_core::CoreError;
use revdb_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("document already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("queue closed")]
    QueueClosed,

    #[error("transaction rolled back by a failed nested operation")]
    TransactionAborted,

    #[error("{applied} force-insert items applied, {} failed", .failures.len())]
    PartialFailure {
        applied: usize,
        failures: Vec<ForceInsertFailure>,
    },
}

/// One force-insert item that could not be applied.
#[derive(Debug, Clone)]
pub struct ForceInsertFailure {
    pub doc_id: String,
    pub rev_id: String,
    pub reason: String,
    pub recoverable: bool,
}

impl EngineError {
    /// Whether a caller may reasonably re-read and retry.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::Conflict(_) | Self::AlreadyExists(_) | Self::Io(_) => true,
            Self::Storage(StorageError::Sqlite(_)) | Self::Storage(StorageError::Io(_)) => true,
            Self::PartialFailure { failures, .. } => failures.iter().all(|f| f.recoverable),
            Self::Storage(_)
            | Self::InvalidInput(_)
            | Self::InvariantViolation(_)
            | Self::QueueClosed
            | Self::TransactionAborted => false,
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidRevisionId(_) | CoreError::InvalidBody(_) => {
                Self::InvalidInput(e.to_string())
            }
            CoreError::Serialization(_) | CoreError::InvalidData(_) => {
                Self::InvariantViolation(e.to_string())
            }
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(what) => Self::NotFound(what),
            StorageError::DocumentCollision { doc_id } => Self::AlreadyExists(doc_id),
            StorageError::ConstraintViolation(msg) | StorageError::TransactionState(msg) => {
                Self::InvariantViolation(msg)
            }
            StorageError::Io(io) => Self::Io(io),
            StorageError::Core(core) => core.into(),
            other => Self::Storage(other),
        }
    }
}
