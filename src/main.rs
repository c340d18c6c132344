//! Directory-Harvester main entry point
//!
//! This is the command-line interface for the Directory-Harvester crawler.

use anyhow::Context;
use clap::Parser;
use directory_harvester::config::{load_config_with_hash, Config, StorageBackend};
use directory_harvester::crawler::{crawl, Orchestrator};
use directory_harvester::output::{export_json, load_statistics, print_statistics};
use directory_harvester::storage::open_store;
use directory_harvester::{RunReport, RunStatus};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Directory-Harvester: a resumable directory crawler
///
/// Discovers entity detail pages from a listing page, extracts organization
/// and people records from each, and persists them so an interrupted or
/// blocked run can pick up where it left off.
#[derive(Parser, Debug)]
#[command(name = "directory-harvester")]
#[command(version)]
#[command(about = "A resumable directory crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Discard stored progress and records before crawling
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export"])]
    fresh: bool,

    /// Validate config and discover links without fetching detail pages
    #[arg(long, conflicts_with_all = ["stats", "export"])]
    dry_run: bool,

    /// Show statistics from the store and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export"])]
    stats: bool,

    /// Write stored records to PATH as a JSON array and exit
    #[arg(long, value_name = "PATH", conflicts_with_all = ["dry_run", "stats"])]
    export: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config, &config_hash).await?;
    } else if cli.stats {
        handle_stats(&config, &config_hash)?;
    } else if let Some(path) = &cli.export {
        handle_export(&config, &config_hash, path)?;
    } else {
        return handle_crawl(&config, &config_hash, cli.fresh).await;
    }

    Ok(ExitCode::SUCCESS)
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("directory_harvester=info,warn"),
            1 => EnvFilter::new("directory_harvester=debug,info"),
            2 => EnvFilter::new("directory_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the configuration and what a run would fetch
async fn handle_dry_run(config: &Config, config_hash: &str) -> anyhow::Result<()> {
    println!("=== Directory-Harvester Dry Run ===\n");

    println!("Target:");
    println!("  Listing page: {}", config.target.listing_url);
    println!("  Detail path: {}", config.target.detail_path);

    println!("\nSession:");
    println!("  Login marker: {}", config.session.login_marker);
    println!("  Timeout: {}s", config.session.timeout_secs);
    println!("  Max redirects: {}", config.session.max_redirects);
    println!("  Strict redirects: {}", config.session.strict_redirects);
    println!("  User agent: {}", config.session.user_agent);

    println!("\nOutput:");
    match config.output.backend {
        StorageBackend::Files => {
            println!("  Progress: {}", config.output.progress_path);
            println!("  Records: {}", config.output.output_path);
        }
        StorageBackend::Sqlite => println!("  Database: {}", config.output.database_path),
    }

    println!("\n✓ Configuration is valid");

    let store = open_store(&config.output, config_hash).context("failed to open store")?;
    let orchestrator = Orchestrator::from_config(config, store)?;
    let plan = orchestrator.plan().await.context("discovery failed")?;

    println!(
        "✓ Discovered {} links: {} pending, {} already done",
        plan.discovered, plan.pending, plan.done
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the store
fn handle_stats(config: &Config, config_hash: &str) -> anyhow::Result<()> {
    let store = open_store(&config.output, config_hash).context("failed to open store")?;
    let stats = load_statistics(store.as_ref())?;
    print_statistics(&stats);
    Ok(())
}

/// Handles the --export mode: writes stored records as one JSON document
fn handle_export(config: &Config, config_hash: &str, path: &Path) -> anyhow::Result<()> {
    let store = open_store(&config.output, config_hash).context("failed to open store")?;
    let written = export_json(store.as_ref(), path)
        .with_context(|| format!("failed to export to {}", path.display()))?;
    println!("✓ Exported {} records to: {}", written, path.display());
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, config_hash: &str, fresh: bool) -> anyhow::Result<ExitCode> {
    if fresh {
        tracing::info!("Starting fresh crawl (ignoring previous state)");
    } else {
        tracing::info!("Starting crawl (will resume from stored progress)");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing current link");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let report = crawl(config, config_hash, fresh, shutdown)
        .await
        .context("crawl failed")?;
    print_report(&report);

    Ok(match report.status {
        RunStatus::Completed => ExitCode::SUCCESS,
        RunStatus::Aborted { .. } => ExitCode::from(2),
        RunStatus::Interrupted => ExitCode::from(130),
    })
}

fn print_report(report: &RunReport) {
    println!("\n=== Run Report ===\n");
    println!("Status: {}", report.status);
    println!("  Discovered: {}", report.discovered);
    println!("  Persisted: {}", report.persisted);
    println!("  Skipped: {}", report.skipped);
    println!("  Failed: {}", report.failed.len());
    println!("  Records written: {}", report.records_written);
    println!("  Remaining: {}", report.remaining);
    println!("  Elapsed: {:.1}s", report.elapsed.as_secs_f64());

    if !report.failed.is_empty() {
        println!("\nFailed links (retried on next run):");
        for failed in &report.failed {
            println!("  - {}: {}", failed.link, failed.cause);
        }
    }

    if report.status.is_aborted() {
        println!("\n✗ The site redirected to its login page; resume once access is restored");
    } else if report.is_clean() {
        println!("\n✓ All links processed");
    }
}
