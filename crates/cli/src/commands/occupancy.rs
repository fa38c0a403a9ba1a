//! occupancy CLI command: per-offer or per-group occupancy over a window.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use vastwatch_core::AppConfig;
use vastwatch_occupancy::report::{
    default_window, occupancy_by_group, occupancy_by_offer, GroupDimension, GroupOccupancyRow,
    OccupancyQuery, OfferOccupancyRow, UNKNOWN_LABEL,
};

use super::common::{format_timestamp, parse_timestamp, poll_interval, FilterArgs, SnapshotSource, StoreArgs};
use crate::table::{fixed, fixed_opt, TextTable};

/// Arguments for the occupancy command.
#[derive(Args, Debug, Clone)]
pub struct OccupancyArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Window start, ISO 8601 (default: earliest snapshot)
    #[arg(long, value_parser = parse_timestamp)]
    pub since: Option<DateTime<Utc>>,

    /// Window end, ISO 8601, exclusive (default: latest snapshot + poll interval)
    #[arg(long, value_parser = parse_timestamp)]
    pub until: Option<DateTime<Utc>>,

    /// Poll interval used to extrapolate the last state (default: collector setting)
    #[arg(long)]
    pub poll_interval_secs: Option<u64>,

    /// Minimum snapshots per offer (default: report.min_samples)
    #[arg(long)]
    pub min_samples: Option<usize>,

    /// Minimum sampled minutes per offer (default: report.min_total_minutes)
    #[arg(long)]
    pub min_total_minutes: Option<f64>,

    /// Maximum rows to print
    #[arg(long)]
    pub limit: Option<usize>,

    /// Aggregate by gpu, gpu-count, region, verification or gpu-and-count
    #[arg(long)]
    pub group_by: Option<GroupDimension>,
}

/// Runs the occupancy command.
///
/// # Errors
/// Returns an error if the store cannot be opened or queried, or the window is empty.
pub async fn run_occupancy(args: OccupancyArgs, config: &AppConfig) -> Result<()> {
    let source = SnapshotSource::open(&args.store, config).await?;
    let poll = poll_interval(args.poll_interval_secs, config)?;

    let Some(window) = default_window(source.store(), args.since, args.until, poll).await? else {
        println!("No snapshots found");
        return Ok(());
    };

    let mut query = OccupancyQuery::new(window, poll)
        .with_filter(args.filter.to_filter())
        .with_min_samples(args.min_samples.unwrap_or(config.report.min_samples))
        .with_min_total_minutes(
            args.min_total_minutes
                .unwrap_or(config.report.min_total_minutes),
        );
    if let Some(limit) = args.limit {
        query = query.with_limit(limit);
    }

    tracing::info!(
        since = %window.since(),
        until = %window.until(),
        poll_interval_secs = poll.num_seconds(),
        "Computing occupancy"
    );

    println!(
        "Window: {} .. {}",
        format_timestamp(window.since()),
        format_timestamp(window.until())
    );

    let rendered = match args.group_by {
        Some(dimension) => {
            let rows = occupancy_by_group(source.store(), &query, dimension).await?;
            (!rows.is_empty()).then(|| render_groups(&rows, dimension))
        }
        None => {
            let rows = occupancy_by_offer(source.store(), &query).await?;
            (!rows.is_empty()).then(|| render_offers(&rows))
        }
    };

    match rendered {
        Some(table) => print!("{table}"),
        None => println!("No offers matched"),
    }
    Ok(())
}

/// Renders per-offer occupancy rows.
pub fn render_offers(rows: &[OfferOccupancyRow]) -> String {
    let mut table = TextTable::new([
        "offer_id",
        "machine_id",
        "gpu_name",
        "gpus",
        "samples",
        "total_h",
        "avail_h",
        "rented_h",
        "unavail_h",
        "unknown_h",
        "avail_pct",
        "rented_pct",
        "unavail_pct",
        "unknown_pct",
        "ratio",
    ]);
    for row in rows {
        table.add_row(vec![
            row.entity.offer_id.to_string(),
            row.entity.machine_id.to_string(),
            row.attributes
                .gpu_name
                .clone()
                .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            row.attributes.num_gpus.to_string(),
            row.samples.to_string(),
            fixed(row.total_hours, 3),
            fixed(row.available_hours, 3),
            fixed(row.rented_hours, 3),
            fixed(row.unavailable_hours, 3),
            fixed(row.unknown_hours, 3),
            fixed(row.available_pct, 2),
            fixed(row.rented_pct, 2),
            fixed(row.unavailable_pct, 2),
            fixed(row.unknown_pct, 2),
            fixed_opt(row.occupancy_ratio, 4),
        ]);
    }
    table.render()
}

/// Renders grouped occupancy rows.
pub fn render_groups(rows: &[GroupOccupancyRow], dimension: GroupDimension) -> String {
    let mut table = TextTable::new([
        dimension.header(),
        "offers",
        "total_h",
        "occupied_h",
        "unavail_h",
        "ratio",
    ]);
    for row in rows {
        table.add_row(vec![
            row.group.clone(),
            row.offers.to_string(),
            fixed(row.total_hours, 3),
            fixed(row.occupied_hours, 3),
            fixed(row.unavailable_hours, 3),
            fixed_opt(row.occupancy_ratio, 4),
        ]);
    }
    table.render()
}
