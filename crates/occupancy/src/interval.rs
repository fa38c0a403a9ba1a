//! Interval reconstruction from discrete snapshots.
//!
//! Each snapshot opens an interval tagged with its state. The interval runs
//! until the entity's next snapshot or, for the last snapshot, for one poll
//! interval past the observation (tail extrapolation). Both ends are clipped
//! to the query window and empty intervals are dropped.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use vastwatch_core::{
    duration_hours, EntityKey, OccupancyError, OfferState, Result, SnapshotRecord, TimeWindow,
};

/// A span of time during which one entity was in one observed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Interval {
    pub entity: EntityKey,
    pub state: OfferState,
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
}

impl Interval {
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    #[must_use]
    pub fn hours(&self) -> f64 {
        duration_hours(self.duration())
    }
}

/// Converts ordered snapshot sequences into non-overlapping intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalReconstructor {
    poll_interval: Duration,
}

impl IntervalReconstructor {
    /// Creates a reconstructor with the given tail-extrapolation horizon.
    ///
    /// # Errors
    /// Returns `InvalidPollInterval` if `poll_interval` is not positive.
    pub fn new(poll_interval: Duration) -> Result<Self> {
        if poll_interval <= Duration::zero() {
            return Err(OccupancyError::InvalidPollInterval {
                seconds: poll_interval.num_seconds(),
            });
        }
        Ok(Self { poll_interval })
    }

    /// Creates a reconstructor from a poll interval in seconds.
    ///
    /// # Errors
    /// Returns `InvalidPollInterval` if `secs` is zero.
    pub fn from_secs(secs: u64) -> Result<Self> {
        let secs = i64::try_from(secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1_000);
        Self::new(Duration::seconds(secs))
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Reconstructs intervals for a single entity.
    ///
    /// `snapshots` must belong to one entity and be ordered by timestamp.
    /// An empty sequence yields no intervals.
    #[must_use]
    pub fn reconstruct(&self, snapshots: &[SnapshotRecord], window: &TimeWindow) -> Vec<Interval> {
        let mut intervals = Vec::with_capacity(snapshots.len());

        for (idx, snapshot) in snapshots.iter().enumerate() {
            let horizon = match snapshots.get(idx + 1) {
                Some(next) => next.timestamp,
                // Saturate at the window end when the tail overflows.
                None => snapshot
                    .timestamp
                    .checked_add_signed(self.poll_interval)
                    .unwrap_or_else(|| window.until()),
            };

            let start = snapshot.timestamp.max(window.since());
            let end = horizon.min(window.until());
            if end <= start {
                continue;
            }

            intervals.push(Interval {
                entity: snapshot.entity,
                state: snapshot.state,
                start,
                end,
            });
        }

        intervals
    }

    /// Reconstructs intervals for one entity over `[since, until)`.
    ///
    /// # Errors
    /// Returns `InvalidRange` if `until <= since`.
    pub fn reconstruct_between(
        &self,
        snapshots: &[SnapshotRecord],
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Interval>> {
        let window = TimeWindow::new(since, until)?;
        Ok(self.reconstruct(snapshots, &window))
    }

    /// Reconstructs intervals for many entities.
    ///
    /// `snapshots` must be ordered by `(entity, timestamp)`, which is the
    /// order `SnapshotStore::snapshots_in_range` returns.
    #[must_use]
    pub fn reconstruct_all(&self, snapshots: &[SnapshotRecord], window: &TimeWindow) -> Vec<Interval> {
        entity_runs(snapshots)
            .flat_map(|run| self.reconstruct(run, window))
            .collect()
    }
}

/// Splits `(entity, timestamp)`-ordered records into one slice per entity.
#[must_use]
pub fn entity_runs(records: &[SnapshotRecord]) -> EntityRuns<'_> {
    EntityRuns { rest: records }
}

/// Iterator over per-entity runs of snapshots.
#[derive(Debug, Clone)]
pub struct EntityRuns<'a> {
    rest: &'a [SnapshotRecord],
}

impl<'a> Iterator for EntityRuns<'a> {
    type Item = &'a [SnapshotRecord];

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.first()?;
        let len = self
            .rest
            .iter()
            .take_while(|r| r.entity == first.entity)
            .count();
        let (run, rest) = self.rest.split_at(len);
        self.rest = rest;
        Some(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn window(since: i64, until: i64) -> TimeWindow {
        TimeWindow::new(at(since), at(until)).unwrap()
    }

    fn snap(offer: i64, hour: i64, state: OfferState) -> SnapshotRecord {
        SnapshotRecord::new(EntityKey::new(offer, 100), at(hour), state)
    }

    fn six_hours() -> IntervalReconstructor {
        IntervalReconstructor::new(Duration::hours(6)).unwrap()
    }

    #[test]
    fn test_consecutive_snapshots_partition_window() {
        let snaps = vec![
            snap(1, 0, OfferState::Available),
            snap(1, 6, OfferState::Rented),
            snap(1, 12, OfferState::Rented),
            snap(1, 18, OfferState::Available),
        ];
        let intervals = six_hours().reconstruct(&snaps, &window(0, 24));

        let spans: Vec<(DateTime<Utc>, DateTime<Utc>, OfferState)> =
            intervals.iter().map(|i| (i.start, i.end, i.state)).collect();
        assert_eq!(
            spans,
            vec![
                (at(0), at(6), OfferState::Available),
                (at(6), at(12), OfferState::Rented),
                (at(12), at(18), OfferState::Rented),
                (at(18), at(24), OfferState::Available),
            ]
        );
    }

    #[test]
    fn test_tail_extrapolation_single_snapshot() {
        let snaps = vec![snap(1, 0, OfferState::Rented)];
        let intervals = six_hours().reconstruct(&snaps, &window(0, 12));
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].start, at(0));
        assert_eq!(intervals[0].end, at(6));
    }

    #[test]
    fn test_tail_clipped_by_until() {
        let snaps = vec![snap(1, 0, OfferState::Rented)];
        let intervals = six_hours().reconstruct(&snaps, &window(0, 4));
        assert_eq!(intervals[0].end, at(4));
        assert!((intervals[0].hours() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_start_clipped_by_since() {
        let snaps = vec![snap(1, 0, OfferState::Available), snap(1, 6, OfferState::Rented)];
        let intervals = six_hours().reconstruct(&snaps, &window(3, 9));
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].start, at(3));
        assert_eq!(intervals[0].end, at(6));
        assert_eq!(intervals[1].end, at(9));
    }

    #[test]
    fn test_collapsed_intervals_dropped() {
        // The first interval ends exactly at since and must vanish.
        let snaps = vec![snap(1, 0, OfferState::Available), snap(1, 6, OfferState::Rented)];
        let intervals = six_hours().reconstruct(&snaps, &window(6, 12));
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].state, OfferState::Rented);
    }

    #[test]
    fn test_empty_sequence_yields_nothing() {
        assert!(six_hours().reconstruct(&[], &window(0, 24)).is_empty());
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let err = six_hours()
            .reconstruct_between(&[], at(5), at(5))
            .unwrap_err();
        assert!(matches!(err, OccupancyError::InvalidRange { .. }));
    }

    #[test]
    fn test_non_positive_poll_interval_rejected() {
        assert!(IntervalReconstructor::new(Duration::zero()).is_err());
        assert!(IntervalReconstructor::from_secs(0).is_err());
        assert_eq!(
            IntervalReconstructor::from_secs(360).unwrap().poll_interval(),
            Duration::minutes(6)
        );
    }

    #[test]
    fn test_gap_is_bridged_to_next_observation() {
        // An entity missing from intermediate cycles keeps its last state.
        let snaps = vec![snap(1, 0, OfferState::Rented), snap(1, 18, OfferState::Available)];
        let intervals = six_hours().reconstruct(&snaps, &window(0, 24));
        assert_eq!(intervals[0].end, at(18));
        assert_eq!(intervals[1].end, at(24));
    }

    #[test]
    fn test_reconstruct_all_splits_entities() {
        let snaps = vec![
            snap(1, 0, OfferState::Available),
            snap(1, 6, OfferState::Rented),
            snap(2, 0, OfferState::Rented),
        ];
        let intervals = six_hours().reconstruct_all(&snaps, &window(0, 24));
        assert_eq!(intervals.len(), 3);
        // Entity 1's last interval is extrapolated, not bridged into entity 2.
        assert_eq!(intervals[1].entity.offer_id, 1);
        assert_eq!(intervals[1].end, at(12));
        assert_eq!(intervals[2].entity.offer_id, 2);
        assert_eq!(intervals[2].end, at(6));
    }

    #[test]
    fn test_entity_runs() {
        let snaps = vec![
            snap(1, 0, OfferState::Available),
            snap(1, 6, OfferState::Rented),
            snap(3, 0, OfferState::Rented),
        ];
        let runs: Vec<usize> = entity_runs(&snaps).map(<[SnapshotRecord]>::len).collect();
        assert_eq!(runs, vec![2, 1]);
        assert_eq!(entity_runs(&[]).count(), 0);
    }

    #[test]
    fn test_huge_poll_interval_saturates_at_window_end() {
        let snaps = vec![snap(1, 0, OfferState::Rented)];
        let reconstructor = IntervalReconstructor::from_secs(u64::MAX).unwrap();
        let intervals = reconstructor.reconstruct(&snaps, &window(0, 1));
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].end, at(1));
    }
}
