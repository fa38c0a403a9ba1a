//! Summary of what a snapshot store holds.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use vastwatch_core::SnapshotRecord;

/// Row count, time bounds, and cardinalities of stored snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataStatus {
    pub rows: i64,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
    /// Distinct poll timestamps
    pub poll_cycles: i64,
    /// Distinct non-null GPU model names
    pub gpu_models: i64,
    /// Distinct offers
    pub offers: i64,
}

impl DataStatus {
    /// Computes the status of an in-memory record set.
    #[must_use]
    pub fn from_records(records: &[SnapshotRecord]) -> Self {
        let cycles: BTreeSet<DateTime<Utc>> = records.iter().map(|r| r.timestamp).collect();
        let models: BTreeSet<&str> = records
            .iter()
            .filter_map(|r| r.attributes.gpu_name.as_deref())
            .collect();
        let offers: BTreeSet<i64> = records.iter().map(|r| r.entity.offer_id).collect();

        Self {
            rows: to_i64(records.len()),
            earliest: cycles.first().copied(),
            latest: cycles.last().copied(),
            poll_cycles: to_i64(cycles.len()),
            gpu_models: to_i64(models.len()),
            offers: to_i64(offers.len()),
        }
    }

    /// Average spacing between poll cycles, if there are at least two.
    #[must_use]
    pub fn mean_cycle_spacing(&self) -> Option<chrono::Duration> {
        let (earliest, latest) = self.earliest.zip(self.latest)?;
        if self.poll_cycles < 2 {
            return None;
        }
        let gaps = i32::try_from(self.poll_cycles - 1).ok()?;
        Some((latest - earliest) / gaps)
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
