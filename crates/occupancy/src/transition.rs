//! State transition detection.
//!
//! Transitions are found in two phases. First the distinct poll timestamps of
//! the window are discovered (one cheap, unfiltered pass). Then each pair of
//! consecutive timestamps is resolved with one narrow point lookup restricted
//! to exactly those two timestamps and the caller's grouping filter, and
//! same-entity rows are joined in memory. Work is bounded by
//! `poll cycles × entities per cycle`; there is deliberately no whole-window
//! self-join.
//!
//! Adjacency is defined by poll cycles: an entity absent from a cycle has no
//! pair spanning that cycle.

use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream, StreamExt, TryStreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use vastwatch_core::{
    EntityKey, OccupancyError, OfferAttributes, OfferState, Result, SnapshotFilter, SnapshotRecord,
    SnapshotStore, TimeWindow,
};

/// A `(from, to)` state pair to look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TransitionPattern {
    from: OfferState,
    to: OfferState,
}

impl TransitionPattern {
    /// Creates a pattern.
    ///
    /// # Errors
    /// Returns `InvalidPattern` if both states are equal.
    pub fn new(from: OfferState, to: OfferState) -> Result<Self> {
        if from == to {
            return Err(OccupancyError::InvalidPattern {
                state: from.to_string(),
            });
        }
        Ok(Self { from, to })
    }

    /// AVAILABLE -> RENTED, the pattern behind clearing prices.
    #[must_use]
    pub fn rented() -> Self {
        Self {
            from: OfferState::Available,
            to: OfferState::Rented,
        }
    }

    /// RENTED -> AVAILABLE.
    #[must_use]
    pub fn released() -> Self {
        Self {
            from: OfferState::Rented,
            to: OfferState::Available,
        }
    }

    #[must_use]
    pub fn from_state(&self) -> OfferState {
        self.from
    }

    #[must_use]
    pub fn to_state(&self) -> OfferState {
        self.to
    }

    #[must_use]
    pub fn matches(&self, prev: &SnapshotRecord, curr: &SnapshotRecord) -> bool {
        prev.state == self.from && curr.state == self.to
    }
}

/// A detected state change between two consecutive snapshots of one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub entity: EntityKey,
    pub from_state: OfferState,
    pub to_state: OfferState,
    /// Timestamp of the later snapshot
    pub at: DateTime<Utc>,
    /// Price on the earlier snapshot (the clearing price for AVAILABLE -> RENTED)
    pub price_before: Option<Decimal>,
    /// Grouping attributes from the later snapshot
    pub attributes: OfferAttributes,
}

impl Transition {
    fn from_pair(prev: &SnapshotRecord, curr: &SnapshotRecord) -> Self {
        Self {
            entity: curr.entity,
            from_state: prev.state,
            to_state: curr.state,
            at: curr.timestamp,
            price_before: prev.price,
            attributes: curr.attributes.clone(),
        }
    }
}

/// Scans one entity's ordered snapshots for `pattern`.
///
/// A sequence with fewer than two snapshots yields nothing.
#[must_use]
pub fn detect_in_sequence(snapshots: &[SnapshotRecord], pattern: TransitionPattern) -> Vec<Transition> {
    snapshots
        .windows(2)
        .filter_map(|pair| match pair {
            [prev, curr] if pattern.matches(prev, curr) => Some(Transition::from_pair(prev, curr)),
            _ => None,
        })
        .collect()
}

/// Joins rows from one timestamp pair by entity and keeps matches.
///
/// Rows at timestamps other than `prev` or `curr` are ignored. Output is
/// ordered by entity.
#[must_use]
pub fn pair_transitions(
    prev: DateTime<Utc>,
    curr: DateTime<Utc>,
    rows: &[SnapshotRecord],
    pattern: TransitionPattern,
) -> Vec<Transition> {
    let mut before: BTreeMap<EntityKey, &SnapshotRecord> = BTreeMap::new();
    let mut after: BTreeMap<EntityKey, &SnapshotRecord> = BTreeMap::new();

    for row in rows {
        if row.timestamp == prev {
            before.insert(row.entity, row);
        } else if row.timestamp == curr {
            after.insert(row.entity, row);
        }
    }

    before
        .into_iter()
        .filter_map(|(entity, p)| {
            let c = after.get(&entity)?;
            pattern.matches(p, c).then(|| Transition::from_pair(p, c))
        })
        .collect()
}

/// Consecutive pairs of a sorted timestamp list.
#[must_use]
pub fn consecutive_pairs(timestamps: &[DateTime<Utc>]) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    timestamps.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Detects transitions against a snapshot store.
#[derive(Debug)]
pub struct TransitionDetector<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> TransitionDetector<'a, S>
where
    S: SnapshotStore + ?Sized,
{
    #[must_use]
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Streams transitions matching `pattern` inside `window`.
    ///
    /// Transitions are produced pair by pair, ordered by time then entity.
    /// The first store failure ends the stream with that error.
    pub fn stream(
        &self,
        window: TimeWindow,
        pattern: TransitionPattern,
        filter: SnapshotFilter,
    ) -> impl Stream<Item = Result<Transition>> + Send + 'a {
        let store = self.store;

        stream::once(async move { store.distinct_timestamps(&window).await })
            .map_ok(|timestamps| {
                tracing::debug!(
                    cycles = timestamps.len(),
                    "Discovered poll timestamps for transition scan"
                );
                stream::iter(
                    consecutive_pairs(&timestamps)
                        .into_iter()
                        .map(Ok::<_, OccupancyError>),
                )
            })
            .try_flatten()
            .and_then(move |(prev, curr)| {
                let filter = filter.clone();
                async move {
                    let rows = store.snapshots_at(prev, curr, &filter).await?;
                    Ok::<_, OccupancyError>(pair_transitions(prev, curr, &rows, pattern))
                }
            })
            .map_ok(|found| stream::iter(found.into_iter().map(Ok::<_, OccupancyError>)))
            .try_flatten()
    }

    /// Collects every transition in the window.
    ///
    /// # Errors
    /// Returns the first store error encountered.
    pub async fn detect(
        &self,
        window: TimeWindow,
        pattern: TransitionPattern,
        filter: SnapshotFilter,
    ) -> Result<Vec<Transition>> {
        self.stream(window, pattern, filter).try_collect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use vastwatch_core::InMemorySnapshotStore;

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn snap(offer: i64, hour: i64, state: OfferState, price: Decimal) -> SnapshotRecord {
        SnapshotRecord::new(EntityKey::new(offer, 500), at(hour), state).with_price(price)
    }

    #[test]
    fn test_pattern_rejects_identical_states() {
        assert!(TransitionPattern::new(OfferState::Rented, OfferState::Rented).is_err());
        let pattern = TransitionPattern::new(OfferState::Unavailable, OfferState::Available).unwrap();
        assert_eq!(pattern.from_state(), OfferState::Unavailable);
        assert_eq!(pattern.to_state(), OfferState::Available);
    }

    #[test]
    fn test_detect_in_sequence_symmetry() {
        let seq = vec![
            snap(1, 1, OfferState::Available, dec!(0.40)),
            snap(1, 2, OfferState::Rented, dec!(0.45)),
            snap(1, 3, OfferState::Available, dec!(0.50)),
        ];

        let rented = detect_in_sequence(&seq, TransitionPattern::rented());
        assert_eq!(rented.len(), 1);
        assert_eq!(rented[0].at, at(2));
        assert_eq!(rented[0].price_before, Some(dec!(0.40)));

        let released = detect_in_sequence(&seq, TransitionPattern::released());
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].at, at(3));
        assert_eq!(released[0].price_before, Some(dec!(0.45)));
    }

    #[test]
    fn test_single_snapshot_has_no_transitions() {
        let seq = vec![snap(1, 1, OfferState::Available, dec!(1))];
        assert!(detect_in_sequence(&seq, TransitionPattern::rented()).is_empty());
    }

    #[test]
    fn test_pair_join_requires_same_entity() {
        let rows = vec![
            snap(1, 0, OfferState::Available, dec!(1.00)),
            snap(2, 1, OfferState::Rented, dec!(2.00)),
            snap(3, 0, OfferState::Available, dec!(3.00)),
            snap(3, 1, OfferState::Rented, dec!(3.10)),
        ];
        let found = pair_transitions(at(0), at(1), &rows, TransitionPattern::rented());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entity.offer_id, 3);
        assert_eq!(found[0].price_before, Some(dec!(3.00)));
    }

    #[test]
    fn test_consecutive_pairs() {
        assert!(consecutive_pairs(&[at(0)]).is_empty());
        assert_eq!(
            consecutive_pairs(&[at(0), at(1), at(2)]),
            vec![(at(0), at(1)), (at(1), at(2))]
        );
    }

    #[tokio::test]
    async fn test_stream_matches_per_entity_scan() {
        let store = InMemorySnapshotStore::new(vec![
            snap(1, 0, OfferState::Available, dec!(1.00)),
            snap(1, 1, OfferState::Rented, dec!(1.00)),
            snap(1, 2, OfferState::Available, dec!(1.10)),
            snap(1, 3, OfferState::Rented, dec!(1.10)),
            snap(2, 0, OfferState::Rented, dec!(0.80)),
            snap(2, 1, OfferState::Available, dec!(0.80)),
            snap(2, 2, OfferState::Rented, dec!(0.75)),
            snap(2, 3, OfferState::Rented, dec!(0.75)),
        ]);
        let window = TimeWindow::new(at(0), at(4)).unwrap();

        let detector = TransitionDetector::new(&store);
        let found = detector
            .detect(window, TransitionPattern::rented(), SnapshotFilter::new())
            .await
            .unwrap();

        let summary: Vec<(i64, DateTime<Utc>, Option<Decimal>)> = found
            .iter()
            .map(|t| (t.entity.offer_id, t.at, t.price_before))
            .collect();
        assert_eq!(
            summary,
            vec![
                (1, at(1), Some(dec!(1.00))),
                (2, at(2), Some(dec!(0.80))),
                (1, at(3), Some(dec!(1.10))),
            ]
        );

        let mut oracle: Vec<Transition> = crate::interval::entity_runs(store.records())
            .flat_map(|run| detect_in_sequence(run, TransitionPattern::rented()))
            .collect();
        oracle.sort_by(|a, b| a.at.cmp(&b.at).then(a.entity.cmp(&b.entity)));
        assert_eq!(found, oracle);
    }
}
