//! SQLite storage implementation
//!
//! A commit inserts the link's records and its progress entry in one
//! transaction, so the two can never disagree.

use crate::crawler::{LinkId, Record};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CrawlStore, StorageResult};
use crate::storage::{ProgressSet, StoreMetadata, StoredRecord};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const CONFIG_HASH_KEY: &str = "config_hash";
const UPDATED_AT_KEY: &str = "updated_at";

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
    config_hash: String,
}

impl SqliteStore {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path, config_hash: &str) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA foreign_keys = ON;
        ",
        )?;

        Self::from_connection(conn, config_hash)
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory(config_hash: &str) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::from_connection(conn, config_hash)
    }

    fn from_connection(conn: Connection, config_hash: &str) -> StorageResult<Self> {
        initialize_schema(&conn)?;
        let store = Self {
            conn,
            config_hash: config_hash.to_string(),
        };

        if let Some(previous) = store.get_metadata(CONFIG_HASH_KEY)? {
            if previous != config_hash {
                tracing::warn!(
                    "Database was written with a different configuration (hash {})",
                    previous
                );
            }
        }

        Ok(store)
    }

    fn get_metadata(&self, key: &str) -> StorageResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

impl CrawlStore for SqliteStore {
    fn load_progress(&self) -> StorageResult<ProgressSet> {
        let mut stmt = self.conn.prepare("SELECT link_id FROM links")?;
        let links = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|link| link.map(LinkId::new))
            .collect::<Result<ProgressSet, _>>()?;
        Ok(links)
    }

    fn commit(&mut self, link: &LinkId, records: &[Record]) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        {
            let mut insert = tx.prepare(
                "INSERT INTO records (link_id, organization_name, organization_email,
                 organization_phone, organization_province, person_name, person_role, team_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for record in records {
                insert.execute(params![
                    link.as_str(),
                    record.organization_name,
                    record.organization_email,
                    record.organization_phone,
                    record.organization_province,
                    record.person_name,
                    record.person_role,
                    record.team_count,
                ])?;
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO links (link_id, persisted_at) VALUES (?1, ?2)",
            params![link.as_str(), now],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2), (?3, ?4)",
            params![CONFIG_HASH_KEY, self.config_hash, UPDATED_AT_KEY, now],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn load_records(&self) -> StorageResult<Vec<StoredRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT link_id, organization_name, organization_email, organization_phone,
             organization_province, person_name, person_role, team_count
             FROM records ORDER BY id",
        )?;

        let records = stmt
            .query_map([], |row| {
                Ok(StoredRecord {
                    link: LinkId::new(row.get::<_, String>(0)?),
                    record: Record {
                        organization_name: row.get(1)?,
                        organization_email: row.get(2)?,
                        organization_phone: row.get(3)?,
                        organization_province: row.get(4)?,
                        person_name: row.get(5)?,
                        person_role: row.get(6)?,
                        team_count: row.get(7)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn metadata(&self) -> StorageResult<StoreMetadata> {
        Ok(StoreMetadata {
            config_hash: self.get_metadata(CONFIG_HASH_KEY)?,
            updated_at: self.get_metadata(UPDATED_AT_KEY)?,
        })
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.conn.execute_batch(
            "
            BEGIN;
            DELETE FROM records;
            DELETE FROM links;
            DELETE FROM metadata;
            COMMIT;
        ",
        )?;
        Ok(())
    }
}
