//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawler::{LinkId, Record};
use crate::storage::{ProgressSet, StoreMetadata, StoredRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt store at {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persists the progress set and the record collection together
///
/// Implementations must keep one invariant: the stored records are exactly
/// the records of the links in the progress set. A link's records are
/// written before the link is marked done, and a crash in between must not
/// leave the link marked done.
pub trait CrawlStore {
    /// Loads the set of links already processed
    fn load_progress(&self) -> StorageResult<ProgressSet>;

    /// Durably appends `records` and then marks `link` as processed
    fn commit(&mut self, link: &LinkId, records: &[Record]) -> StorageResult<()>;

    /// Loads every stored record, grouped by link in commit order
    fn load_records(&self) -> StorageResult<Vec<StoredRecord>>;

    /// Returns metadata about the last commit
    fn metadata(&self) -> StorageResult<StoreMetadata>;

    /// Removes all progress and records
    fn clear(&mut self) -> StorageResult<()>;
}

impl<S: CrawlStore + ?Sized> CrawlStore for Box<S> {
    fn load_progress(&self) -> StorageResult<ProgressSet> {
        (**self).load_progress()
    }

    fn commit(&mut self, link: &LinkId, records: &[Record]) -> StorageResult<()> {
        (**self).commit(link, records)
    }

    fn load_records(&self) -> StorageResult<Vec<StoredRecord>> {
        (**self).load_records()
    }

    fn metadata(&self) -> StorageResult<StoreMetadata> {
        (**self).metadata()
    }

    fn clear(&mut self) -> StorageResult<()> {
        (**self).clear()
    }
}
