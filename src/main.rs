//! raid-detector - OpenStreetMap changeset raid detector
//!
//! # Usage
//!
//! ```bash
//! # Ingest everything published since the last run (schedule every minute)
//! raid-detector update
//!
//! # Cluster the 48-hour window and write raid candidates as GeoJSON
//! raid-detector detect --output raids.geojson
//!
//! # Inspect the stored window
//! raid-detector status
//! ```
//!
//! # Environment Variables
//!
//! - `RAID_DETECTOR_CONFIG`: Path to a TOML config file (default: ./raid_detector.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use raid_detector::config::DetectorConfig;
use raid_detector::detection::to_feature_collection;
use raid_detector::replication::HttpSource;
use raid_detector::storage::{ChangesetStore, ProcessLock};
use raid_detector::{run_detect, run_update};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "raid-detector")]
#[command(about = "Detect bursts of co-located OpenStreetMap edits")]
#[command(version)]
struct CliArgs {
    /// TOML config file (overrides RAID_DETECTOR_CONFIG and ./raid_detector.toml)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Changeset database directory
    #[arg(short, long, value_name = "PATH", global = true)]
    database: Option<PathBuf>,

    /// Concurrent download workers
    #[arg(short, long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Fetch and store every replication delta since the last run
    Update,

    /// Cluster the stored window and emit raid candidates as GeoJSON
    Detect {
        /// Write GeoJSON here instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Print store statistics
    Status,
}

// ============================================================================
// Commands
// ============================================================================

async fn update(config: &DetectorConfig) -> Result<()> {
    let _lock = acquire_lock(config)?;
    let store = open_store(config)?;
    let source = HttpSource::new(&config.replication).context("Failed to build HTTP client")?;

    let summary = run_update(config, &store, Arc::new(source))
        .await
        .context("Update failed")?;

    println!(
        "sequence {} -> {}: {} resources, {} changesets stored, {} pruned",
        summary
            .previous_sequence
            .map_or_else(|| "none".to_string(), |s| s.to_string()),
        summary.remote_sequence,
        summary.resources_fetched,
        summary.changesets_stored,
        summary.changesets_pruned
    );
    Ok(())
}

async fn detect(config: &DetectorConfig, output: Option<&Path>) -> Result<()> {
    let _lock = acquire_lock(config)?;
    let store = open_store(config)?;

    let report = run_detect(config, &store).await.context("Detection failed")?;
    let geojson = to_feature_collection(&report.raids)
        .to_json_pretty()
        .context("Failed to render GeoJSON")?;

    match output {
        Some(path) => {
            std::fs::write(path, geojson + "\n")
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), raids = report.raids.len(), "GeoJSON written");
        }
        None => println!("{geojson}"),
    }
    Ok(())
}

fn status(config: &DetectorConfig) -> Result<()> {
    let _lock = acquire_lock(config)?;
    let store = open_store(config)?;
    let stats = store.stats().context("Failed to read store statistics")?;

    let fmt_ts = |ts: Option<i64>| {
        ts.and_then(|t| chrono::DateTime::from_timestamp(t, 0))
            .map_or_else(|| "-".to_string(), |dt| dt.to_rfc3339())
    };

    println!("database:     {}", config.storage.database_path.display());
    println!("changesets:   {}", stats.changeset_count);
    println!("oldest:       {}", fmt_ts(stats.oldest_created_at));
    println!("newest:       {}", fmt_ts(stats.newest_created_at));
    println!(
        "window:       {}",
        stats
            .window_hours()
            .map_or_else(|| "-".to_string(), |h| format!("{h:.1} h"))
    );
    println!(
        "watermark:    {}",
        stats
            .server_sequence
            .map_or_else(|| "none".to_string(), |s| s.to_string())
    );
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn load_config(args: &CliArgs) -> Result<DetectorConfig> {
    let config = match &args.config {
        Some(path) => DetectorConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DetectorConfig::load().context("Failed to load configuration")?,
    };
    let config = config.with_overrides(args.database.clone(), args.threads);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// The lock lives beside the database directory, not inside sled's files.
fn acquire_lock(config: &DetectorConfig) -> Result<ProcessLock> {
    let data_dir = config
        .storage
        .database_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ProcessLock::acquire(data_dir)
}

fn open_store(config: &DetectorConfig) -> Result<ChangesetStore> {
    let path = &config.storage.database_path;
    ChangesetStore::open(path)
        .with_context(|| format!("Failed to open changeset store at {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so GeoJSON on stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let config = load_config(&args)?;

    match args.command {
        SubCommand::Update => update(&config).await,
        SubCommand::Detect { output } => detect(&config, output.as_deref()).await,
        SubCommand::Status => status(&config),
    }
}
