//! Storage module for persisting crawl progress and records
//!
//! This module handles everything the crawler writes to disk:
//! - The progress set (links already processed), used to resume
//! - The record collection, appended to after every processed link
//!
//! Two backends are provided: plain files (JSON progress document + JSON
//! Lines records) and a single SQLite database.

mod files;
mod schema;
mod sqlite;
mod traits;

pub use files::FileStore;
pub use sqlite::SqliteStore;
pub use traits::{CrawlStore, StorageError, StorageResult};

use crate::config::{OutputConfig, StorageBackend};
use crate::crawler::{LinkId, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Opens the store selected by the output configuration
///
/// # Arguments
///
/// * `config` - The output configuration
/// * `config_hash` - Hash of the configuration file, recorded with each commit
pub fn open_store(
    config: &OutputConfig,
    config_hash: &str,
) -> StorageResult<Box<dyn CrawlStore>> {
    match config.backend {
        StorageBackend::Files => Ok(Box::new(FileStore::open(
            Path::new(&config.progress_path),
            Path::new(&config.output_path),
            config_hash,
        )?)),
        StorageBackend::Sqlite => Ok(Box::new(SqliteStore::new(
            Path::new(&config.database_path),
            config_hash,
        )?)),
    }
}

/// Links already processed; only ever grows during a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressSet(BTreeSet<LinkId>);

impl ProgressSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, link: &LinkId) -> bool {
        self.0.contains(link)
    }

    /// Adds a link; returns false if it was already present
    pub fn insert(&mut self, link: LinkId) -> bool {
        self.0.insert(link)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LinkId> {
        self.0.iter()
    }
}

impl FromIterator<LinkId> for ProgressSet {
    fn from_iter<I: IntoIterator<Item = LinkId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A record together with the link that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub link: LinkId,
    #[serde(flatten)]
    pub record: Record,
}

/// Bookkeeping written alongside the progress set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreMetadata {
    /// Hash of the configuration used for the last commit
    pub config_hash: Option<String>,
    /// RFC 3339 timestamp of the last commit
    pub updated_at: Option<String>,
}
