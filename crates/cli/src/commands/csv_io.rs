//! import-csv and export-csv CLI commands.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;
use vastwatch_core::{AppConfig, SnapshotFilter, TimeWindow};
use vastwatch_data::{CsvStorage, OfferSnapshotRecord, OfferSnapshotRepository};

use super::common::{connect_database, parse_timestamp};

/// Arguments for the import-csv command.
#[derive(Args, Debug, Clone)]
pub struct ImportCsvArgs {
    /// CSV file with a header row matching the snapshot columns
    #[arg(long)]
    pub input: PathBuf,

    /// Database connection URL (falls back to DATABASE_URL, then config)
    #[arg(long, env = "DATABASE_URL")]
    pub db_url: Option<String>,
}

/// Arguments for the export-csv command.
#[derive(Args, Debug, Clone)]
pub struct ExportCsvArgs {
    /// Output CSV file path
    #[arg(short, long)]
    pub output: PathBuf,

    /// Only rows at or after this time, ISO 8601
    #[arg(long, value_parser = parse_timestamp)]
    pub since: Option<DateTime<Utc>>,

    /// Only rows before this time, ISO 8601
    #[arg(long, value_parser = parse_timestamp)]
    pub until: Option<DateTime<Utc>>,

    /// Database connection URL (falls back to DATABASE_URL, then config)
    #[arg(long, env = "DATABASE_URL")]
    pub db_url: Option<String>,
}

/// Groups rows by poll timestamp so each cycle is inserted atomically.
pub fn group_by_cycle(
    records: Vec<OfferSnapshotRecord>,
) -> BTreeMap<DateTime<Utc>, Vec<OfferSnapshotRecord>> {
    let mut cycles: BTreeMap<DateTime<Utc>, Vec<OfferSnapshotRecord>> = BTreeMap::new();
    for record in records {
        cycles.entry(record.timestamp).or_default().push(record);
    }
    cycles
}

/// Runs the import-csv command.
///
/// # Errors
/// Returns an error if the file cannot be parsed or an insert fails.
pub async fn run_import_csv(args: ImportCsvArgs, config: &AppConfig) -> Result<()> {
    let records = CsvStorage::read_snapshots(&args.input)?;
    let total = records.len();
    tracing::info!(rows = total, path = %args.input.display(), "Read snapshots from CSV");

    let db = connect_database(args.db_url.as_deref(), config).await?;
    let repo = OfferSnapshotRepository::new(db.pool().clone());

    let cycles = group_by_cycle(records);
    let cycle_count = cycles.len();
    let mut inserted = 0u64;
    for (timestamp, batch) in cycles {
        inserted += repo
            .insert_batch(&batch)
            .await
            .with_context(|| format!("Failed to insert cycle {timestamp}"))?;
    }

    tracing::info!(
        rows = total,
        cycles = cycle_count,
        inserted,
        "Import complete"
    );
    println!(
        "Imported {} of {} rows across {} poll cycles ({} duplicates skipped)",
        inserted,
        total,
        cycle_count,
        (total as u64).saturating_sub(inserted)
    );
    Ok(())
}

/// Runs the export-csv command.
///
/// # Errors
/// Returns an error if the window is invalid, the query fails, or the file
/// cannot be written.
pub async fn run_export_csv(args: ExportCsvArgs, config: &AppConfig) -> Result<()> {
    let db = connect_database(args.db_url.as_deref(), config).await?;
    let repo = OfferSnapshotRepository::new(db.pool().clone());

    let records = match (args.since, args.until) {
        (None, None) => repo.query_all().await?,
        (since, until) => {
            let Some((earliest, latest)) = repo.get_data_bounds().await? else {
                println!("No snapshots found");
                return Ok(());
            };
            let since = since.unwrap_or(earliest);
            // Exclusive end; step past the last cycle so it is included.
            let until = until.unwrap_or(latest + chrono::Duration::seconds(1));
            let window = TimeWindow::new(since, until)?;
            repo.query_range(&window, &SnapshotFilter::new()).await?
        }
    };

    let written = CsvStorage::write_snapshots(&args.output, &records)?;
    tracing::info!(rows = written, path = %args.output.display(), "Exported snapshots");
    println!("Exported {} rows to {}", written, args.output.display());
    Ok(())
}
