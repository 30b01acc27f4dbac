use std::path::PathBuf;

use revdb_storage::StorageOptions;
use serde::Deserialize;

/// How a store is opened.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file. `None` keeps the database in memory.
    pub path: Option<PathBuf>,
    /// Directory for attachment blobs. `None` keeps blobs in memory.
    pub attachments_dir: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub cache_size_kib: i64,
    /// Number of recent change events kept for polling.
    pub change_history: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let storage = StorageOptions::default();
        Self {
            path: None,
            attachments_dir: None,
            busy_timeout_ms: storage.busy_timeout_ms,
            cache_size_kib: storage.cache_size_kib,
            change_history: 1024,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_attachments_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.attachments_dir = Some(dir.into());
        self
    }

    pub fn with_busy_timeout_ms(mut self, ms: u64) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    pub fn with_change_history(mut self, events: usize) -> Self {
        self.change_history = events;
        self
    }

    pub(crate) fn storage_options(&self) -> StorageOptions {
        StorageOptions {
            busy_timeout_ms: self.busy_timeout_ms,
            cache_size_kib: self.cache_size_kib,
        }
    }
}
