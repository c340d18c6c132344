//! Statistics generation from the persisted store
//!
//! This module provides functionality for summarizing what a store holds
//! and displaying it.

use crate::storage::{CrawlStore, StoreMetadata, StoredRecord};
use crate::Result;
use std::collections::{BTreeMap, BTreeSet};

/// Province bucket for organizations without one
pub const UNKNOWN_PROVINCE: &str = "(unknown)";

/// Harvest statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestStatistics {
    /// Links in the progress set
    pub links_done: usize,

    /// Records stored
    pub records: usize,

    /// Distinct organizations (one per link with at least one record)
    pub organizations: usize,

    /// Organizations with an email address
    pub with_email: usize,

    /// Organizations with a phone number
    pub with_phone: usize,

    /// Record count per organization province
    pub records_by_province: BTreeMap<String, usize>,

    /// Bookkeeping from the last commit
    pub metadata: StoreMetadata,
}

impl HarvestStatistics {
    /// Computes statistics from stored records
    pub fn from_records(links_done: usize, records: &[StoredRecord]) -> Self {
        let mut stats = Self {
            links_done,
            records: records.len(),
            ..Self::default()
        };

        let mut seen = BTreeSet::new();
        for stored in records {
            let record = &stored.record;
            let province = record
                .organization_province
                .clone()
                .unwrap_or_else(|| UNKNOWN_PROVINCE.to_string());
            *stats.records_by_province.entry(province).or_insert(0) += 1;

            // Organization fields are identical across a link's records
            if seen.insert(&stored.link) {
                stats.organizations += 1;
                if record.organization_email.is_some() {
                    stats.with_email += 1;
                }
                if record.organization_phone.is_some() {
                    stats.with_phone += 1;
                }
            }
        }

        stats
    }
}

/// Loads statistics from a store
///
/// # Arguments
///
/// * `store` - The store to summarize
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to read the store
pub fn load_statistics(store: &dyn CrawlStore) -> Result<HarvestStatistics> {
    let progress = store.load_progress()?;
    let records = store.load_records()?;

    let mut stats = HarvestStatistics::from_records(progress.len(), &records);
    stats.metadata = store.metadata()?;
    Ok(stats)
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Links processed: {}", stats.links_done);
    println!("  Records stored: {}", stats.records);
    println!("  Organizations with people: {}", stats.organizations);
    if let Some(updated_at) = &stats.metadata.updated_at {
        println!("  Last update: {}", updated_at);
    }
    println!();

    println!("Contact Coverage:");
    println!(
        "  With email: {} ({:.1}%)",
        stats.with_email,
        percentage(stats.with_email, stats.organizations)
    );
    println!(
        "  With phone: {} ({:.1}%)",
        stats.with_phone,
        percentage(stats.with_phone, stats.organizations)
    );
    println!();

    if !stats.records_by_province.is_empty() {
        println!("Records by Province:");
        let mut provinces: Vec<_> = stats.records_by_province.iter().collect();
        provinces.sort_by(|a, b| b.1.cmp(a.1));

        for (province, count) in provinces {
            println!("  {}: {}", province, count);
        }
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}
