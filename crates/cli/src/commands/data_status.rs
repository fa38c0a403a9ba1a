//! Data status CLI command.
//!
//! Shows how many snapshots the store holds, their time bounds, and how many
//! poll cycles and GPU models were recorded. Used to check coverage before
//! running occupancy reports.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use vastwatch_core::AppConfig;
use vastwatch_data::DataStatus;

use super::common::{SnapshotSource, StoreArgs};

/// Arguments for the data-status command.
#[derive(Args, Debug, Clone)]
pub struct DataStatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}

/// Runs the data-status command.
///
/// # Errors
/// Returns an error if the store cannot be opened or queried.
pub async fn run_data_status(args: DataStatusArgs, config: &AppConfig) -> Result<()> {
    let source = SnapshotSource::open(&args.store, config).await?;
    let status = source.status().await?;

    tracing::debug!(rows = status.rows, cycles = status.poll_cycles, "Queried data status");
    print!("{}", format_status(&status));
    Ok(())
}

/// Formats the status report.
pub fn format_status(status: &DataStatus) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", "=".repeat(60)));
    out.push_str("DATA STATUS REPORT\n");
    out.push_str(&format!("{}\n", "=".repeat(60)));
    out.push_str(&format!("{:<20} {:>20}\n", "Rows", format_count(status.rows)));
    out.push_str(&format!("{:<20} {:>20}\n", "Earliest", format_date(status.earliest)));
    out.push_str(&format!("{:<20} {:>20}\n", "Latest", format_date(status.latest)));
    out.push_str(&format!("{:<20} {:>20}\n", "Poll cycles", status.poll_cycles));
    out.push_str(&format!("{:<20} {:>20}\n", "Offers", status.offers));
    out.push_str(&format!("{:<20} {:>20}\n", "GPU models", status.gpu_models));

    let spacing = status
        .mean_cycle_spacing()
        .map(|d| format!("{:.1} min", d.num_seconds() as f64 / 60.0))
        .unwrap_or_else(|| "-".to_string());
    out.push_str(&format!("{:<20} {:>20}\n", "Mean cycle spacing", spacing));

    let span = match (status.earliest, status.latest) {
        (Some(e), Some(l)) => format!("{:.1} h", (l - e).num_minutes() as f64 / 60.0),
        _ => "-".to_string(),
    };
    out.push_str(&format!("{:<20} {:>20}\n", "Span", span));
    out.push_str(&format!("{}\n", "=".repeat(60)));

    if status.poll_cycles < 2 {
        out.push_str("Fewer than two poll cycles: no transitions can be detected yet.\n");
    }
    out
}

fn format_date(dt: Option<DateTime<Utc>>) -> String {
    dt.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

fn format_count(count: i64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(5500), "5.5K");
        assert_eq!(format_count(2_500_000), "2.5M");
    }

    #[test]
    fn test_format_date() {
        let dt = Utc.with_ymd_and_hms(2025, 1, 15, 12, 30, 45).unwrap();
        assert_eq!(format_date(Some(dt)), "2025-01-15 12:30:45");
        assert_eq!(format_date(None), "N/A");
    }

    #[test]
    fn test_format_status_report() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let status = DataStatus {
            rows: 1200,
            earliest: Some(t0),
            latest: Some(t0 + chrono::Duration::hours(1)),
            poll_cycles: 11,
            gpu_models: 4,
            offers: 110,
        };
        let report = format_status(&status);
        assert!(report.contains("DATA STATUS REPORT"));
        assert!(report.contains("1.2K"));
        assert!(report.contains("6.0 min"));
        assert!(report.contains("1.0 h"));
        assert!(!report.contains("Fewer than two"));
    }

    #[test]
    fn test_format_status_empty_store() {
        let status = DataStatus {
            rows: 0,
            earliest: None,
            latest: None,
            poll_cycles: 0,
            gpu_models: 0,
            offers: 0,
        };
        let report = format_status(&status);
        assert!(report.contains("N/A"));
        assert!(report.contains("Fewer than two poll cycles"));
    }
}
