//! latest CLI command: market summary at the most recent poll cycle.

use anyhow::Result;
use clap::Args;
use vastwatch_core::AppConfig;
use vastwatch_occupancy::report::{
    latest_market_summary, latest_market_summary_split, MarketSummaryRow, SortSpec, SummaryColumn,
};

use super::common::{poll_interval, FilterArgs, SnapshotSource, StoreArgs};
use crate::table::{money, TextTable};

/// Arguments for the latest command.
#[derive(Args, Debug, Clone)]
pub struct LatestArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Sort column, e.g. "-util_pct" or "+price_rented" (default: rank order)
    #[arg(long, allow_hyphen_values = true)]
    pub sort: Option<SortSpec>,

    /// Poll interval used to extrapolate history (default: collector setting)
    #[arg(long)]
    pub poll_interval_secs: Option<u64>,

    /// Print verified and unverified+deverified providers as separate tables
    #[arg(long)]
    pub split_verified: bool,
}

/// Runs the latest command.
///
/// # Errors
/// Returns an error if the store cannot be opened or queried.
pub async fn run_latest(args: LatestArgs, config: &AppConfig) -> Result<()> {
    let source = SnapshotSource::open(&args.store, config).await?;
    let filter = args.filter.to_filter();
    let poll = poll_interval(args.poll_interval_secs, config)?;

    if args.split_verified {
        let (mut verified, mut others) =
            latest_market_summary_split(source.store(), &filter, poll).await?;
        sort_rows(&mut verified, args.sort);
        sort_rows(&mut others, args.sort);
        println!("Verified providers");
        print_summary(&verified);
        println!();
        println!("Unverified+deverified providers");
        print_summary(&others);
    } else {
        let mut rows = latest_market_summary(source.store(), &filter, poll).await?;
        sort_rows(&mut rows, args.sort);
        print_summary(&rows);
    }

    Ok(())
}

fn sort_rows(rows: &mut [MarketSummaryRow], sort: Option<SortSpec>) {
    if let Some(spec) = sort {
        spec.apply(rows);
    }
}

fn print_summary(rows: &[MarketSummaryRow]) {
    if rows.is_empty() {
        println!("No snapshots found");
        return;
    }
    print!("{}", render_summary(rows));
}

/// Renders market summary rows as an aligned table.
pub fn render_summary(rows: &[MarketSummaryRow]) -> String {
    let mut table = TextTable::new(SummaryColumn::ALL.iter().map(SummaryColumn::header));
    for row in rows {
        table.add_row(vec![
            row.rank.to_string(),
            row.gpu_name.clone(),
            row.gpus.clone(),
            row.offers.to_string(),
            row.available.to_string(),
            row.rented.to_string(),
            row.unavailable.to_string(),
            row.unknown.to_string(),
            money(row.utilization_pct, 2),
            money(row.avg_price_available, 4),
            money(row.avg_price_rented, 4),
            money(row.expected_per_gpu, 4),
            row.verified.to_string(),
            row.deverified.to_string(),
            money(Some(row.avg_gpu_count), 2),
            row.occupancy_samples.to_string(),
            money(row.rented_time_pct, 2),
        ]);
    }
    table.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_render_summary_includes_history_columns() {
        let row = MarketSummaryRow {
            rank: 1,
            gpu_name: "RTX 4090".to_string(),
            gpus: "1x".to_string(),
            offers: 2,
            available: 1,
            rented: 1,
            unavailable: 0,
            unknown: 0,
            utilization_pct: Some(dec!(50)),
            avg_price_available: Some(dec!(0.40)),
            avg_price_rented: Some(dec!(0.45)),
            expected_per_gpu: Some(dec!(0.225)),
            verified: 1,
            deverified: 0,
            avg_gpu_count: dec!(1),
            occupancy_samples: 40,
            rented_time_pct: Some(dec!(37.5)),
        };

        let rendered = render_summary(&[row]);
        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines[0].ends_with("occ_samples  rented_time_pct"));
        assert!(lines[2].ends_with("37.5"));
        assert!(lines[2].contains(" 40 "));
    }
}
