//! Crawl orchestrator - drives discovery, fetch, extract and persist
//!
//! The orchestrator owns the progress set for the duration of a run. Each
//! discovered link walks the [`LinkState`] machine once:
//! - already in the progress set: skipped
//! - fetched and extracted: records committed, then the link is marked done
//! - transient failure: logged, left for the next run
//! - login redirect: the run stops, nothing is marked for that link

use crate::config::Config;
use crate::crawler::discovery::LinkDiscovery;
use crate::crawler::extractor::EntityExtractor;
use crate::crawler::fetcher::{
    DetailUrlTemplate, EntityFetcher, FetchError, FetchOutcome, LoginGate,
};
use crate::crawler::record::LinkId;
use crate::crawler::transport::{HttpTransport, PageTransport};
use crate::state::{LinkState, RunStatus};
use crate::storage::{CrawlStore, ProgressSet};
use crate::{HarvestError, Result};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// A link whose fetch failed transiently during the run
#[derive(Debug)]
pub struct FailedLink {
    pub link: LinkId,
    pub cause: FetchError,
}

/// Summary of one crawl run
#[derive(Debug)]
pub struct RunReport {
    pub status: RunStatus,
    /// Links found on the listing page, duplicates included
    pub discovered: usize,
    pub skipped: usize,
    pub persisted: usize,
    pub failed: Vec<FailedLink>,
    pub records_written: usize,
    /// Distinct discovered links still missing from the progress set
    pub remaining: usize,
    pub elapsed: Duration,
}

impl RunReport {
    /// True if every discovered link ended up skipped or persisted
    pub fn is_clean(&self) -> bool {
        self.status.is_completed() && self.failed.is_empty()
    }
}

/// What discovery found, compared against the persisted progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlPlan {
    pub discovered: usize,
    /// Distinct links already in the progress set
    pub done: usize,
    /// Distinct links that a run would fetch
    pub pending: usize,
}

enum LinkOutcome {
    Skipped,
    Persisted { records: usize },
    Failed(FetchError),
    Aborted { target: String },
}

impl LinkOutcome {
    fn state(&self) -> LinkState {
        match self {
            Self::Skipped => LinkState::Skipped,
            Self::Persisted { .. } => LinkState::Persisted,
            Self::Failed(_) => LinkState::Failed,
            Self::Aborted { .. } => LinkState::Aborted,
        }
    }
}

/// Runs a crawl against one listing page
pub struct Orchestrator<T, S> {
    listing_url: Url,
    fetcher: EntityFetcher<T>,
    discovery: LinkDiscovery,
    extractor: EntityExtractor,
    store: S,
    shutdown: Arc<AtomicBool>,
}

impl<S: CrawlStore> Orchestrator<HttpTransport, S> {
    /// Creates an orchestrator that fetches over HTTP
    pub fn from_config(config: &Config, store: S) -> Result<Self> {
        let transport = HttpTransport::new(&config.session)?;
        Self::new(config, transport, store)
    }
}

impl<T: PageTransport, S: CrawlStore> Orchestrator<T, S> {
    /// Creates an orchestrator over the given transport and store
    ///
    /// # Arguments
    ///
    /// * `config` - Validated crawl configuration
    /// * `transport` - Navigation capability used for every page
    /// * `store` - Durable progress and record storage
    pub fn new(config: &Config, transport: T, store: S) -> Result<Self> {
        let listing_url = Url::parse(&config.target.listing_url)?;
        let fetcher = EntityFetcher::new(
            transport,
            LoginGate::from_config(&config.session),
            DetailUrlTemplate::new(listing_url.clone(), config.target.detail_path.clone()),
            Duration::from_secs(config.session.timeout_secs),
        );

        Ok(Self {
            listing_url,
            fetcher,
            discovery: LinkDiscovery::new(&config.target)?,
            extractor: EntityExtractor::new(&config.extractor)?,
            store,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Replaces the shutdown flag checked between links
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Flag that, once set, stops the run before the next link
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Loads the listing page and returns its links in row order
    ///
    /// Any failure here, including a login redirect or a listing without
    /// links, is a discovery error: there is nothing to iterate.
    pub async fn discover(&self) -> Result<Vec<LinkId>> {
        let discovery_error = |reason: String| HarvestError::Discovery {
            url: self.listing_url.to_string(),
            reason,
        };

        let page = match self.fetcher.fetch_url(&self.listing_url).await {
            FetchOutcome::Success(page) => page,
            FetchOutcome::FatalRedirect(target) => {
                return Err(discovery_error(format!(
                    "listing page redirected to login page {}",
                    target
                )))
            }
            FetchOutcome::TransientError(cause) => return Err(discovery_error(cause.to_string())),
        };

        let links = self.discovery.discover(&page);
        if links.is_empty() {
            return Err(discovery_error("no links found on listing page".to_string()));
        }

        Ok(links)
    }

    /// Runs discovery only and compares the result against stored progress
    pub async fn plan(&self) -> Result<CrawlPlan> {
        let links = self.discover().await?;
        let progress = self.store.load_progress()?;
        let unique: BTreeSet<&LinkId> = links.iter().collect();
        let done = unique.iter().filter(|link| progress.contains(link)).count();

        Ok(CrawlPlan {
            discovered: links.len(),
            done,
            pending: unique.len() - done,
        })
    }

    /// Runs the crawl to completion, abort or interruption
    ///
    /// Per-link failures never surface as errors; only discovery and storage
    /// failures do.
    pub async fn run(&mut self) -> Result<RunReport> {
        let start_time = Instant::now();
        tracing::info!("Discovering links from {}", self.listing_url);

        let links = self.discover().await?;
        let mut progress = self.store.load_progress()?;
        let total = links.len();
        tracing::info!(
            "Discovered {} links, {} already in progress set",
            total,
            links.iter().filter(|link| progress.contains(link)).count()
        );

        let mut report = RunReport {
            status: RunStatus::Completed,
            discovered: total,
            skipped: 0,
            persisted: 0,
            failed: Vec::new(),
            records_written: 0,
            remaining: 0,
            elapsed: Duration::ZERO,
        };

        let mut done = 0;
        let mut errored = 0;

        for (index, link) in links.iter().enumerate() {
            if self.shutdown.load(Ordering::SeqCst) {
                tracing::warn!("Shutdown requested, stopping before link {}", link);
                report.status = RunStatus::Interrupted;
                break;
            }

            tracing::info!("[{}/{}] Processing link {}", index + 1, total, link);

            let outcome = self.process_link(link, &mut progress).await?;
            let state = outcome.state();
            tracing::debug!("Link {} finished as {}", link, state);
            if state.is_done() {
                done += 1;
            } else if state.is_error() {
                errored += 1;
            }

            match outcome {
                LinkOutcome::Skipped => {
                    tracing::debug!("Link {} already processed, skipping", link);
                    report.skipped += 1;
                }
                LinkOutcome::Persisted { records } => {
                    tracing::info!("Link {}: {} records persisted", link, records);
                    report.persisted += 1;
                    report.records_written += records;
                }
                LinkOutcome::Failed(cause) => {
                    tracing::warn!("Link {} failed, will retry next run: {}", link, cause);
                    report.failed.push(FailedLink {
                        link: link.clone(),
                        cause,
                    });
                }
                LinkOutcome::Aborted { target } => {
                    tracing::error!("Link {} redirected to login page {}, aborting", link, target);
                    report.status = RunStatus::Aborted {
                        link: link.clone(),
                        target,
                    };
                    break;
                }
            }

            let visited = index + 1;
            if visited % 10 == 0 {
                let elapsed = start_time.elapsed();
                let rate = visited as f64 / elapsed.as_secs_f64();
                tracing::info!(
                    "Progress: {}/{} links visited, {} done, {} failed, {:.2} links/sec",
                    visited,
                    total,
                    done,
                    errored,
                    rate
                );
            }
        }

        report.remaining = remaining(&links, &progress);
        report.elapsed = start_time.elapsed();

        tracing::info!(
            "Crawl {}: {} persisted, {} skipped, {} failed, {} records, {} remaining in {:?}",
            report.status,
            report.persisted,
            report.skipped,
            report.failed.len(),
            report.records_written,
            report.remaining,
            report.elapsed
        );

        Ok(report)
    }

    /// Walks one link through the state machine
    ///
    /// Records are committed before the link enters the progress set.
    async fn process_link(
        &mut self,
        link: &LinkId,
        progress: &mut ProgressSet,
    ) -> Result<LinkOutcome> {
        let state = LinkState::Pending;

        if progress.contains(link) {
            state.advance(LinkState::Skipped)?;
            return Ok(LinkOutcome::Skipped);
        }

        let state = state.advance(LinkState::Fetching)?;
        let page = match self.fetcher.fetch(link).await {
            FetchOutcome::Success(page) => page,
            FetchOutcome::FatalRedirect(target) => {
                state.advance(LinkState::Aborted)?;
                return Ok(LinkOutcome::Aborted { target });
            }
            FetchOutcome::TransientError(cause) => {
                state.advance(LinkState::Failed)?;
                return Ok(LinkOutcome::Failed(cause));
            }
        };

        let state = state.advance(LinkState::Extracting)?;
        let records = self.extractor.extract(&page);

        self.store.commit(link, &records)?;
        progress.insert(link.clone());
        state.advance(LinkState::Persisted)?;

        Ok(LinkOutcome::Persisted {
            records: records.len(),
        })
    }
}

fn remaining(links: &[LinkId], progress: &ProgressSet) -> usize {
    links
        .iter()
        .filter(|link| !progress.contains(link))
        .collect::<BTreeSet<_>>()
        .len()
}
