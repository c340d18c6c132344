//! JSON export of the persisted record collection

use crate::crawler::Record;
use crate::storage::{CrawlStore, StorageError};
use crate::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes every stored record to `output_path` as one pretty-printed JSON array
///
/// # Returns
///
/// * `Ok(usize)` - Number of records written
/// * `Err(HarvestError)` - Failed to read the store or write the file
pub fn export_json(store: &dyn CrawlStore, output_path: &Path) -> Result<usize> {
    let records: Vec<Record> = store
        .load_records()?
        .into_iter()
        .map(|stored| stored.record)
        .collect();

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(output_path)?);
    serde_json::to_writer_pretty(&mut writer, &records).map_err(StorageError::from)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    Ok(records.len())
}
