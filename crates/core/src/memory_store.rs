//! In-memory snapshot store.
//!
//! Backs offline reports (CSV imports) and tests. Records are kept sorted by
//! `(entity, timestamp)` with a secondary timestamp index, mirroring the two
//! access paths a database store would index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::filter::SnapshotFilter;
use crate::snapshot::SnapshotRecord;
use crate::traits::SnapshotStore;
use crate::window::TimeWindow;

/// Snapshot store held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshotStore {
    /// Records sorted by `(entity, timestamp)`
    records: Vec<SnapshotRecord>,
    /// Timestamp -> positions in `records`
    by_timestamp: BTreeMap<DateTime<Utc>, Vec<usize>>,
}

impl InMemorySnapshotStore {
    /// Creates a store from arbitrary-order records.
    ///
    /// Duplicate `(entity, timestamp)` rows are collapsed, keeping the first.
    #[must_use]
    pub fn new(records: impl IntoIterator<Item = SnapshotRecord>) -> Self {
        let mut records: Vec<SnapshotRecord> = records.into_iter().collect();
        records.sort_by(|a, b| {
            a.entity
                .cmp(&b.entity)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });
        records.dedup_by(|later, earlier| {
            later.entity == earlier.entity && later.timestamp == earlier.timestamp
        });

        let mut by_timestamp: BTreeMap<DateTime<Utc>, Vec<usize>> = BTreeMap::new();
        for (idx, record) in records.iter().enumerate() {
            by_timestamp.entry(record.timestamp).or_default().push(idx);
        }

        Self {
            records,
            by_timestamp,
        }
    }

    /// Number of stored snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the store holds no snapshots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, ordered by `(entity, timestamp)`.
    #[must_use]
    pub fn records(&self) -> &[SnapshotRecord] {
        &self.records
    }

    fn collect_at(&self, timestamps: &[DateTime<Utc>], filter: &SnapshotFilter) -> Vec<SnapshotRecord> {
        let mut positions: Vec<usize> = timestamps
            .iter()
            .filter_map(|ts| self.by_timestamp.get(ts))
            .flatten()
            .copied()
            .collect();
        positions.sort_unstable();
        positions.dedup();

        positions
            .into_iter()
            .map(|idx| &self.records[idx])
            .filter(|r| filter.matches(&r.attributes))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn snapshots_in_range(
        &self,
        window: &TimeWindow,
        filter: &SnapshotFilter,
    ) -> Result<Vec<SnapshotRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| window.contains(r.timestamp) && filter.matches(&r.attributes))
            .cloned()
            .collect())
    }

    async fn distinct_timestamps(&self, window: &TimeWindow) -> Result<Vec<DateTime<Utc>>> {
        Ok(self
            .by_timestamp
            .range(window.since()..window.until())
            .map(|(ts, _)| *ts)
            .collect())
    }

    async fn snapshots_at(
        &self,
        first: DateTime<Utc>,
        second: DateTime<Utc>,
        filter: &SnapshotFilter,
    ) -> Result<Vec<SnapshotRecord>> {
        Ok(self.collect_at(&[first, second], filter))
    }

    async fn latest_snapshot(&self, filter: &SnapshotFilter) -> Result<Vec<SnapshotRecord>> {
        Ok(match self.by_timestamp.keys().next_back() {
            Some(latest) => self.collect_at(&[*latest], filter),
            None => Vec::new(),
        })
    }

    async fn bounds(&self) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let first = self.by_timestamp.keys().next();
        let last = self.by_timestamp.keys().next_back();
        Ok(first.zip(last).map(|(a, b)| (*a, *b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{EntityKey, OfferAttributes, OfferState};
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap()
    }

    fn snap(offer: i64, hour: u32, state: OfferState, gpu: &str) -> SnapshotRecord {
        SnapshotRecord::new(EntityKey::new(offer, offer * 10), at(hour), state)
            .with_attributes(OfferAttributes::new(gpu, 1))
    }

    fn sample_store() -> InMemorySnapshotStore {
        InMemorySnapshotStore::new(vec![
            snap(2, 1, OfferState::Rented, "A100"),
            snap(1, 2, OfferState::Rented, "RTX 4090"),
            snap(1, 0, OfferState::Available, "RTX 4090"),
            snap(2, 0, OfferState::Available, "A100"),
            snap(1, 1, OfferState::Available, "RTX 4090"),
        ])
    }

    #[tokio::test]
    async fn test_range_is_ordered_by_entity_then_time() {
        let store = sample_store();
        let window = TimeWindow::new(at(0), at(3)).unwrap();
        let rows = store
            .snapshots_in_range(&window, &SnapshotFilter::new())
            .await
            .unwrap();

        let keys: Vec<(i64, u32)> = rows
            .iter()
            .map(|r| (r.entity.offer_id, chrono::Timelike::hour(&r.timestamp)))
            .collect();
        assert_eq!(keys, vec![(1, 0), (1, 1), (1, 2), (2, 0), (2, 1)]);
    }

    #[tokio::test]
    async fn test_range_excludes_until() {
        let store = sample_store();
        let window = TimeWindow::new(at(0), at(2)).unwrap();
        let rows = store
            .snapshots_in_range(&window, &SnapshotFilter::new())
            .await
            .unwrap();
        assert_eq!(rows.len(), 4);
    }

    #[tokio::test]
    async fn test_distinct_timestamps_are_deduplicated() {
        let store = sample_store();
        let window = TimeWindow::new(at(0), at(10)).unwrap();
        let ts = store.distinct_timestamps(&window).await.unwrap();
        assert_eq!(ts, vec![at(0), at(1), at(2)]);
    }

    #[tokio::test]
    async fn test_point_lookup_applies_filter() {
        let store = sample_store();
        let filter = SnapshotFilter::new().with_gpu_names(["4090"]);
        let rows = store.snapshots_at(at(0), at(1), &filter).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.entity.offer_id == 1));
    }

    #[tokio::test]
    async fn test_latest_and_bounds() {
        let store = sample_store();
        let latest = store.latest_snapshot(&SnapshotFilter::new()).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].timestamp, at(2));
        assert_eq!(store.bounds().await.unwrap(), Some((at(0), at(2))));
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = InMemorySnapshotStore::default();
        assert!(store.is_empty());
        assert_eq!(store.bounds().await.unwrap(), None);
        assert!(store
            .latest_snapshot(&SnapshotFilter::new())
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_duplicate_rows_collapse() {
        let store = InMemorySnapshotStore::new(vec![
            snap(1, 0, OfferState::Available, "A100"),
            snap(1, 0, OfferState::Rented, "A100"),
        ]);
        assert_eq!(store.len(), 1);
    }
}
