//! File-backed storage
//!
//! Records go to a JSON Lines file, one record per line tagged with its link,
//! so the file stays parseable after every append. Progress is a small JSON
//! document rewritten atomically (temp file + rename) after every commit.

use crate::crawler::{LinkId, Record};
use crate::storage::traits::{CrawlStore, StorageError, StorageResult};
use crate::storage::{ProgressSet, StoreMetadata, StoredRecord};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// On-disk shape of the progress file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressDocument {
    #[serde(default)]
    config_hash: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    links: ProgressSet,
}

/// JSON progress document + JSON Lines record file
#[derive(Debug)]
pub struct FileStore {
    progress_path: PathBuf,
    output_path: PathBuf,
    config_hash: String,
    document: ProgressDocument,
}

impl FileStore {
    /// Opens (or creates on first commit) the progress and output files
    ///
    /// Records whose link is missing from the progress set are left over from
    /// a crash between the two writes of a commit; they are dropped here, as
    /// is a partially written last line.
    pub fn open(progress_path: &Path, output_path: &Path, config_hash: &str) -> StorageResult<Self> {
        let document = read_progress(progress_path)?;

        if let Some(previous) = &document.config_hash {
            if previous != config_hash {
                tracing::warn!(
                    "Progress in {} was written with a different configuration (hash {})",
                    progress_path.display(),
                    previous
                );
            }
        }

        let store = Self {
            progress_path: progress_path.to_path_buf(),
            output_path: output_path.to_path_buf(),
            config_hash: config_hash.to_string(),
            document,
        };
        store.reconcile()?;

        tracing::debug!(
            "Opened file store with {} processed links",
            store.document.links.len()
        );

        Ok(store)
    }

    fn reconcile(&self) -> StorageResult<()> {
        let Some(content) = read_optional(&self.output_path)? else {
            return Ok(());
        };

        let parsed = parse_lines(&self.output_path, &content)?;
        let total = parsed.records.len();
        let kept: Vec<StoredRecord> = parsed
            .records
            .into_iter()
            .filter(|stored| self.document.links.contains(&stored.link))
            .collect();

        let orphans = total - kept.len();
        if orphans == 0 && !parsed.truncated_tail {
            return Ok(());
        }

        tracing::warn!(
            "Repairing {}: dropping {} records without a progress entry{}",
            self.output_path.display(),
            orphans,
            if parsed.truncated_tail {
                " and a truncated last line"
            } else {
                ""
            }
        );

        let mut buffer = Vec::new();
        for stored in &kept {
            serde_json::to_writer(&mut buffer, stored)?;
            buffer.push(b'\n');
        }
        write_atomically(&self.output_path, &buffer)
    }

    fn append_records(&self, link: &LinkId, records: &[Record]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        ensure_parent(&self.output_path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output_path)?;
        let mut writer = BufWriter::new(file);

        for record in records {
            let stored = StoredRecord {
                link: link.clone(),
                record: record.clone(),
            };
            serde_json::to_writer(&mut writer, &stored)?;
            writer.write_all(b"\n")?;
        }

        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_data()?;
        Ok(())
    }
}

impl CrawlStore for FileStore {
    fn load_progress(&self) -> StorageResult<ProgressSet> {
        Ok(self.document.links.clone())
    }

    fn commit(&mut self, link: &LinkId, records: &[Record]) -> StorageResult<()> {
        self.append_records(link, records)?;

        let mut document = self.document.clone();
        document.links.insert(link.clone());
        document.config_hash = Some(self.config_hash.clone());
        document.updated_at = Some(Utc::now().to_rfc3339());

        write_atomically(&self.progress_path, &serde_json::to_vec_pretty(&document)?)?;
        self.document = document;
        Ok(())
    }

    fn load_records(&self) -> StorageResult<Vec<StoredRecord>> {
        match read_optional(&self.output_path)? {
            Some(content) => Ok(parse_lines(&self.output_path, &content)?.records),
            None => Ok(Vec::new()),
        }
    }

    fn metadata(&self) -> StorageResult<StoreMetadata> {
        Ok(StoreMetadata {
            config_hash: self.document.config_hash.clone(),
            updated_at: self.document.updated_at.clone(),
        })
    }

    /// Removes progress before records, so a partial clear leaves only
    /// orphan records for `open` to drop
    fn clear(&mut self) -> StorageResult<()> {
        remove_if_exists(&self.progress_path)?;
        remove_if_exists(&self.output_path)?;
        self.document = ProgressDocument::default();
        Ok(())
    }
}

struct ParsedLines {
    records: Vec<StoredRecord>,
    truncated_tail: bool,
}

/// Parses a JSON Lines file; only an unterminated last line may be malformed
fn parse_lines(path: &Path, content: &str) -> StorageResult<ParsedLines> {
    let mut records = Vec::new();
    let mut truncated_tail = false;
    let lines: Vec<&str> = content.lines().collect();

    for (index, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<StoredRecord>(line) {
            Ok(stored) => records.push(stored),
            Err(_) if index + 1 == lines.len() && !content.ends_with('\n') => {
                truncated_tail = true;
            }
            Err(e) => {
                return Err(StorageError::Corrupt {
                    path: path.display().to_string(),
                    reason: format!("line {}: {}", index + 1, e),
                })
            }
        }
    }

    Ok(ParsedLines {
        records,
        truncated_tail,
    })
}

fn read_progress(path: &Path) -> StorageResult<ProgressDocument> {
    match read_optional(path)? {
        Some(content) => serde_json::from_str(&content).map_err(|e| StorageError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        }),
        None => Ok(ProgressDocument::default()),
    }
}

fn read_optional(path: &Path) -> StorageResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn remove_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn ensure_parent(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Replaces `path` with `bytes` so readers see either the old or the new file
fn write_atomically(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    ensure_parent(path)?;

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;

    // Make the rename itself durable
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}
