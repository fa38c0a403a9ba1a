//! Arguments and helpers shared by the report commands.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::Args;
use std::path::PathBuf;
use vastwatch_core::{
    AppConfig, InMemorySnapshotStore, SnapshotFilter, SnapshotStore, Verification,
};
use vastwatch_data::{CsvStorage, DataStatus, DatabaseClient, OfferSnapshotRepository};

/// Where report commands read snapshots from.
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Read snapshots from a CSV file instead of the database
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Database connection URL (falls back to DATABASE_URL, then config)
    #[arg(long, env = "DATABASE_URL")]
    pub db_url: Option<String>,
}

/// Grouping filters accepted by every report.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only GPU names containing any of these substrings (repeat or comma separated)
    #[arg(long = "gpu-name")]
    pub gpu_names: Vec<String>,

    /// Only these GPU counts per offer (repeat or comma separated)
    #[arg(long = "gpu-count")]
    pub gpu_counts: Vec<String>,

    /// Only one verification tier (verified, unverified, deverified)
    #[arg(long)]
    pub verification: Option<Verification>,
}

impl FilterArgs {
    /// Builds the store filter. Unparseable GPU counts are skipped.
    pub fn to_filter(&self) -> SnapshotFilter {
        let counts = split_values(&self.gpu_counts)
            .into_iter()
            .filter_map(|token| match token.parse::<i32>() {
                Ok(count) => Some(count),
                Err(_) => {
                    tracing::warn!(token = %token, "Ignoring invalid --gpu-count value");
                    None
                }
            });

        let mut filter = SnapshotFilter::new()
            .with_gpu_names(split_values(&self.gpu_names))
            .with_gpu_counts(counts);
        if let Some(verification) = self.verification {
            filter = filter.with_verification(verification);
        }
        filter
    }
}

/// Splits repeated and comma-separated values, dropping blanks.
pub fn split_values(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses an ISO 8601 timestamp as UTC.
///
/// Accepts a trailing `Z`, an explicit offset, no offset (read as UTC), or a
/// bare date (midnight UTC).
///
/// # Errors
/// Returns an error for empty or unparseable input.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        bail!("empty timestamp");
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }

    Err(anyhow!("invalid ISO 8601 timestamp: {value}"))
}

/// Formats a timestamp as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Poll interval for tail extrapolation: the flag, else the configured one.
///
/// # Errors
/// Returns an error if the value does not fit a duration.
pub fn poll_interval(flag_secs: Option<u64>, config: &AppConfig) -> Result<chrono::Duration> {
    let secs = flag_secs.unwrap_or_else(|| config.collector.effective_poll_interval_secs());
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| anyhow!("poll interval too large: {secs}s"))
}

/// Connects to `PostgreSQL` and makes sure the snapshot table exists.
///
/// # Errors
/// Returns an error if the connection or schema creation fails.
pub async fn connect_database(db_url: Option<&str>, config: &AppConfig) -> Result<DatabaseClient> {
    let url = db_url.unwrap_or(&config.database.url);
    let client = DatabaseClient::connect(url, config.database.max_connections).await?;
    client.ensure_schema().await?;
    tracing::info!("Connected to database");
    Ok(client)
}

/// An opened snapshot store.
pub enum SnapshotSource {
    Csv(InMemorySnapshotStore),
    Postgres(OfferSnapshotRepository),
}

impl SnapshotSource {
    /// Opens the CSV file if given, else the database.
    ///
    /// # Errors
    /// Returns an error if the file cannot be loaded or the database is unreachable.
    pub async fn open(args: &StoreArgs, config: &AppConfig) -> Result<Self> {
        if let Some(path) = &args.csv {
            return Ok(Self::Csv(CsvStorage::load_store(path)?));
        }
        let client = connect_database(args.db_url.as_deref(), config).await?;
        Ok(Self::Postgres(OfferSnapshotRepository::new(client.pool().clone())))
    }

    pub fn store(&self) -> &dyn SnapshotStore {
        match self {
            Self::Csv(store) => store,
            Self::Postgres(repo) => repo,
        }
    }

    /// Row count, bounds and cardinalities of the source.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn status(&self) -> Result<DataStatus> {
        match self {
            Self::Csv(store) => Ok(DataStatus::from_records(store.records())),
            Self::Postgres(repo) => repo.status().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let expected = utc(2025, 3, 1, 12, 30, 0);
        assert_eq!(parse_timestamp("2025-03-01T12:30:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-03-01T12:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-03-01T12:30").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-03-01T14:30:00+02:00").unwrap(), expected);
        assert_eq!(parse_timestamp(" 2025-03-01 ").unwrap(), utc(2025, 3, 1, 0, 0, 0));
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("yesterday").is_err());
        assert!(parse_timestamp("2025-13-01").is_err());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(utc(2025, 3, 1, 0, 6, 0)), "2025-03-01T00:06:00Z");
    }

    #[test]
    fn test_split_values() {
        let values = vec!["4090, 3090".to_string(), String::new(), "H100,".to_string()];
        assert_eq!(split_values(&values), vec!["4090", "3090", "H100"]);
    }

    #[test]
    fn test_filter_args_skip_bad_counts() {
        let args = FilterArgs {
            gpu_names: vec!["RTX 4090".to_string()],
            gpu_counts: vec!["1,2".to_string(), "eight".to_string(), "8".to_string()],
            verification: Some(Verification::Verified),
        };
        let filter = args.to_filter();
        assert_eq!(filter.gpu_names, vec!["rtx 4090"]);
        assert_eq!(filter.gpu_counts, vec![1, 2, 8]);
        assert_eq!(filter.verification, Some(Verification::Verified));
    }

    #[test]
    fn test_poll_interval_prefers_flag() {
        let config = AppConfig::default();
        assert_eq!(poll_interval(Some(60), &config).unwrap(), chrono::Duration::seconds(60));
        assert_eq!(poll_interval(None, &config).unwrap(), chrono::Duration::seconds(360));
    }

    #[test]
    fn test_poll_interval_rejects_out_of_range() {
        let config = AppConfig::default();
        assert!(poll_interval(Some(u64::MAX), &config).is_err());
        assert!(poll_interval(Some(i64::MAX as u64), &config).is_err());
        assert!(poll_interval(Some(86_400 * 365), &config).is_ok());
    }
}
