use crate::error::Result;
use crate::filter::SnapshotFilter;
use crate::snapshot::SnapshotRecord;
use crate::window::TimeWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read-only access to recorded offer snapshots.
///
/// Implementations must be append-only from the reader's point of view and
/// serve two access paths efficiently: by `(gpu_name, entity, timestamp)` and
/// by `timestamp` alone. Store failures are reported as
/// `OccupancyError::StoreUnavailable`; callers own any retry policy.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns snapshots with `since <= timestamp < until` that pass `filter`,
    /// ordered by `(entity, timestamp)`.
    async fn snapshots_in_range(
        &self,
        window: &TimeWindow,
        filter: &SnapshotFilter,
    ) -> Result<Vec<SnapshotRecord>>;

    /// Returns the distinct poll timestamps inside `window`, ascending.
    async fn distinct_timestamps(&self, window: &TimeWindow) -> Result<Vec<DateTime<Utc>>>;

    /// Point lookup: snapshots taken at exactly `first` or `second` that pass
    /// `filter`, ordered by `(entity, timestamp)`.
    async fn snapshots_at(
        &self,
        first: DateTime<Utc>,
        second: DateTime<Utc>,
        filter: &SnapshotFilter,
    ) -> Result<Vec<SnapshotRecord>>;

    /// Returns the snapshots of the most recent poll cycle that pass `filter`.
    async fn latest_snapshot(&self, filter: &SnapshotFilter) -> Result<Vec<SnapshotRecord>>;

    /// Returns the earliest and latest recorded timestamps, or `None` if empty.
    async fn bounds(&self) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>>;
}
