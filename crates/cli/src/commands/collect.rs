//! collect CLI command: polls the marketplace and persists snapshot cycles.
//!
//! The collector and the database writer run as separate tasks joined by a
//! channel carrying one batch per poll cycle. Ctrl+C stops the collector and
//! lets the writer drain what was already fetched.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use std::time::Duration;
use tokio::sync::mpsc;
use vastwatch_core::AppConfig;
use vastwatch_data::{OfferSnapshotRecord, OfferSnapshotRepository};
use vastwatch_vast::{
    CollectorEvent, SnapshotCollector, SnapshotCollectorConfig, VastClient, VastClientConfig,
};

use super::common::connect_database;

const BATCH_CHANNEL_SIZE: usize = 16;
const EVENT_CHANNEL_SIZE: usize = 64;

/// Arguments for the collect command.
#[derive(Args, Debug, Clone)]
pub struct CollectArgs {
    /// Vast API key
    #[arg(long, env = "VAST_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Database connection URL (falls back to DATABASE_URL, then config)
    #[arg(long, env = "DATABASE_URL")]
    pub db_url: Option<String>,

    /// Seconds between poll cycles (raised to the 360s floor)
    #[arg(long)]
    pub poll_interval_secs: Option<u64>,

    /// Stop after this many cycles
    #[arg(long)]
    pub max_cycles: Option<u64>,

    /// Extra search filters as a JSON object, merged into every query
    #[arg(long)]
    pub extra_filters: Option<String>,

    /// Only poll verified hosts
    #[arg(long)]
    pub verified_only: bool,
}

/// Applies command-line overrides to the loaded configuration.
fn apply_overrides(args: &CollectArgs, config: &AppConfig) -> AppConfig {
    let mut config = config.clone();
    if let Some(key) = &args.api_key {
        config.vast.api_key = Some(key.clone());
    }
    if let Some(secs) = args.poll_interval_secs {
        config.collector.poll_interval_secs = secs;
    }
    if let Some(filters) = &args.extra_filters {
        config.collector.extra_filters_json = Some(filters.clone());
    }
    if args.verified_only {
        config.collector.include_unverified = false;
    }
    config
}

/// Runs the collect command.
///
/// # Errors
/// Returns an error if the API key is missing, the database is unreachable,
/// or the HTTP client cannot be built.
pub async fn run_collect(args: CollectArgs, config: &AppConfig) -> Result<()> {
    let config = apply_overrides(&args, config);
    if config.vast.api_key.as_deref().map_or(true, str::is_empty) {
        return Err(anyhow!(
            "Vast API key must be set via --api-key, VAST_API_KEY or vast.api_key"
        ));
    }

    let db = connect_database(args.db_url.as_deref(), &config).await?;
    let repo = OfferSnapshotRepository::new(db.pool().clone());

    let client_config = VastClientConfig::from_config(&config.vast, &config.collector);
    let client = VastClient::new(client_config).context("Failed to build Vast client")?;

    let mut collector_config = SnapshotCollectorConfig::from_config(&config.collector);
    if let Some(max) = args.max_cycles {
        collector_config = collector_config.with_max_cycles(max);
    }

    tracing::info!(
        poll_interval_secs = collector_config.poll_interval.as_secs(),
        max_cycles = ?collector_config.max_cycles,
        include_unverified = config.collector.include_unverified,
        "Starting snapshot collection"
    );

    let (tx, rx) = mpsc::channel::<Vec<OfferSnapshotRecord>>(BATCH_CHANNEL_SIZE);
    let (event_tx, event_rx) = mpsc::channel::<CollectorEvent>(EVENT_CHANNEL_SIZE);

    let mut collector = SnapshotCollector::new(client, collector_config, tx).with_event_channel(event_tx);
    let mut collector_handle = tokio::spawn(async move {
        if let Err(e) = collector.run().await {
            tracing::error!("Collector error: {}", e);
        }
    });
    let writer_handle = tokio::spawn(run_database_writer(rx, repo));
    let monitor_handle = tokio::spawn(run_event_monitor(event_rx));

    tracing::info!("Collection running. Stop with Ctrl+C");

    tokio::select! {
        _ = &mut collector_handle => {
            tracing::info!("Collector finished");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
            collector_handle.abort();
        }
    }

    // The collector's sender is dropped once its task ends, which ends the writer.
    let written = match tokio::time::timeout(Duration::from_secs(30), writer_handle).await {
        Ok(Ok(rows)) => rows,
        Ok(Err(e)) => {
            tracing::error!("Database writer task failed: {}", e);
            0
        }
        Err(_) => {
            tracing::warn!("Timed out waiting for database writer to flush");
            0
        }
    };
    monitor_handle.abort();

    tracing::info!(rows = written, "Collection stopped");
    Ok(())
}

/// Inserts each received cycle in one transaction; returns rows written.
async fn run_database_writer(
    mut rx: mpsc::Receiver<Vec<OfferSnapshotRecord>>,
    repo: OfferSnapshotRepository,
) -> u64 {
    let mut total = 0u64;
    while let Some(batch) = rx.recv().await {
        if batch.is_empty() {
            continue;
        }
        match repo.insert_batch(&batch).await {
            Ok(inserted) => {
                total += inserted;
                tracing::info!("Inserted {} rows", inserted);
            }
            Err(e) => {
                tracing::error!(rows = batch.len(), "Failed to insert snapshot batch: {:#}", e);
            }
        }
    }
    total
}

/// Logs collector events at a level matching their severity.
async fn run_event_monitor(mut rx: mpsc::Receiver<CollectorEvent>) {
    let mut cycles = 0u64;
    while let Some(event) = rx.recv().await {
        match event {
            CollectorEvent::Started => tracing::debug!("Collector started"),
            CollectorEvent::CycleCompleted { timestamp, counts } => {
                cycles += 1;
                tracing::debug!(cycles, %timestamp, offers = counts.total(), "Cycle completed");
            }
            CollectorEvent::BackingOff { attempt, delay, .. } => {
                tracing::debug!(attempt, delay_secs = delay.as_secs(), "Collector backing off");
            }
            CollectorEvent::Stopped => {
                tracing::info!(cycles, "Collector stopped");
                break;
            }
        }
    }
}
