//! Crawler module for discovering, fetching and extracting detail pages
//!
//! This module contains the core crawling logic, including:
//! - Page transport with observable HTTP exchanges
//! - Listing page link discovery
//! - Fetch outcome classification (success, transient error, login redirect)
//! - Record extraction from detail pages
//! - Overall crawl orchestration and resume

mod discovery;
mod extractor;
mod fetcher;
mod orchestrator;
mod record;
mod transport;

pub use discovery::LinkDiscovery;
pub use extractor::EntityExtractor;
pub use fetcher::{DetailUrlTemplate, EntityFetcher, FetchError, FetchOutcome, LoginGate};
pub use orchestrator::{CrawlPlan, FailedLink, Orchestrator, RunReport};
pub use record::{
    LinkId, Record, ORGANIZATION_NAME_UNAVAILABLE, PERSON_NAME_UNAVAILABLE,
    PERSON_ROLE_UNAVAILABLE,
};
pub use transport::{
    build_http_client, EventSender, HttpTransport, LoadedPage, PageTransport, ResponseEvent,
    TransportError,
};

use crate::config::Config;
use crate::storage::open_store;
use crate::Result;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Runs a complete crawl operation over HTTP
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the configured store (clearing it first when `fresh`)
/// 2. Build the HTTP transport
/// 3. Discover links from the listing page
/// 4. Fetch, extract and persist every link not yet processed
///
/// # Arguments
///
/// * `config` - The crawl configuration
/// * `config_hash` - Hash of the configuration file, recorded with progress
/// * `fresh` - Whether to discard existing progress and records
/// * `shutdown` - Flag checked between links; set it to stop the run
///
/// # Returns
///
/// * `Ok(RunReport)` - The run finished, was aborted, or was interrupted
/// * `Err(HarvestError)` - Discovery or storage failed
pub async fn crawl(
    config: &Config,
    config_hash: &str,
    fresh: bool,
    shutdown: Arc<AtomicBool>,
) -> Result<RunReport> {
    let mut store = open_store(&config.output, config_hash)?;
    if fresh {
        tracing::info!("Fresh run requested, clearing stored progress and records");
        store.clear()?;
    }

    let mut orchestrator = Orchestrator::from_config(config, store)?.with_shutdown(shutdown);
    orchestrator.run().await
}
