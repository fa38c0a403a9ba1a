//! transitions CLI command: clearing prices per group.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use rust_decimal::Decimal;
use vastwatch_core::{AppConfig, OfferState};
use vastwatch_occupancy::report::{clearing_prices, default_window, ClearingPriceRow, GroupDimension};
use vastwatch_occupancy::{PriceSummary, TransitionPattern};

use super::common::{format_timestamp, parse_timestamp, poll_interval, FilterArgs, SnapshotSource, StoreArgs};
use crate::table::{money, TextTable};

/// Arguments for the transitions command.
#[derive(Args, Debug, Clone)]
pub struct TransitionsArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// State before the transition
    #[arg(long, default_value = "available")]
    pub from: OfferState,

    /// State after the transition
    #[arg(long, default_value = "rented")]
    pub to: OfferState,

    /// Group by gpu, gpu-count, region, verification or gpu-and-count
    #[arg(long, default_value = "gpu")]
    pub group_by: GroupDimension,

    /// Window start, ISO 8601 (default: earliest snapshot)
    #[arg(long, value_parser = parse_timestamp)]
    pub since: Option<DateTime<Utc>>,

    /// Window end, ISO 8601, exclusive (default: latest snapshot + poll interval)
    #[arg(long, value_parser = parse_timestamp)]
    pub until: Option<DateTime<Utc>>,

    /// Poll interval used for the default window end (default: collector setting)
    #[arg(long)]
    pub poll_interval_secs: Option<u64>,
}

/// Runs the transitions command.
///
/// # Errors
/// Returns an error for an invalid pattern or if the store cannot be queried.
pub async fn run_transitions(args: TransitionsArgs, config: &AppConfig) -> Result<()> {
    let pattern = TransitionPattern::new(args.from, args.to)?;
    let source = SnapshotSource::open(&args.store, config).await?;
    let poll = poll_interval(args.poll_interval_secs, config)?;

    let Some(window) = default_window(source.store(), args.since, args.until, poll).await? else {
        println!("No snapshots found");
        return Ok(());
    };

    tracing::info!(
        from = %args.from,
        to = %args.to,
        group_by = %args.group_by,
        "Detecting transitions"
    );

    let rows = clearing_prices(
        source.store(),
        window,
        pattern,
        args.filter.to_filter(),
        args.group_by,
    )
    .await?;

    println!(
        "{} -> {} transitions, {} .. {}",
        args.from,
        args.to,
        format_timestamp(window.since()),
        format_timestamp(window.until())
    );
    if rows.is_empty() {
        println!("No transitions found");
    } else {
        print!("{}", render_clearing(&rows, args.group_by));
    }
    Ok(())
}

/// Renders clearing price rows; price columns are empty for unpriced groups.
pub fn render_clearing(rows: &[ClearingPriceRow], dimension: GroupDimension) -> String {
    let mut table = TextTable::new([
        dimension.header(),
        "transitions",
        "priced",
        "mean",
        "median",
        "p10",
        "p90",
        "min",
        "max",
    ]);
    for row in rows {
        let prices = row.prices.as_ref();
        let price = |get: fn(&PriceSummary) -> Decimal| money(prices.map(get), 4);
        table.add_row(vec![
            row.group.clone(),
            row.transitions.to_string(),
            prices.map_or(0, |p| p.count).to_string(),
            price(|p| p.mean),
            price(|p| p.median),
            price(|p| p.p10),
            price(|p| p.p90),
            price(|p| p.min),
            price(|p| p.max),
        ]);
    }
    table.render()
}
