pub mod blob;
pub mod error;
pub mod schema;
pub mod sqlite;
pub mod traits;
pub mod transaction;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use error::StorageError;
pub use schema::StorageOptions;
pub use sqlite::SqliteStorage;
pub use traits::*;
pub use transaction::TxOutcome;
