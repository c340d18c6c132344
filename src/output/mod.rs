//! Output module for reporting on harvested data
//!
//! This module handles:
//! - Exporting the record collection as a single JSON document
//! - Computing and printing statistics over a store

mod export;
pub mod stats;

pub use export::export_json;
pub use stats::{load_statistics, print_statistics, HarvestStatistics};
