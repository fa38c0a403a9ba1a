//! End-to-end occupancy and transition scenarios against in-memory stores.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures_util::StreamExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use vastwatch_core::{
    EntityKey, InMemorySnapshotStore, OccupancyError, OfferAttributes, OfferState, Result,
    SnapshotFilter, SnapshotRecord, SnapshotStore, TimeWindow, Verification,
};
use vastwatch_occupancy::report::{
    default_window, occupancy_by, occupancy_by_group, occupancy_by_offer, GroupDimension,
    OccupancyQuery,
};
use vastwatch_occupancy::{
    aggregate_occupancy, IntervalReconstructor, TransitionDetector, TransitionPattern,
};

fn at(hour: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
}

fn window(since: i64, until: i64) -> TimeWindow {
    TimeWindow::new(at(since), at(until)).unwrap()
}

fn snap(offer: i64, hour: i64, state: OfferState, price: Decimal) -> SnapshotRecord {
    SnapshotRecord::new(EntityKey::new(offer, 9000 + offer), at(hour), state)
        .with_price(price)
        .with_attributes(OfferAttributes::new("RTX 4090", 1))
}

/// Entity E from the reference scenario: available, rented twice, available.
fn scenario_records() -> Vec<SnapshotRecord> {
    vec![
        snap(1, 0, OfferState::Available, dec!(1.00)),
        snap(1, 6, OfferState::Rented, dec!(1.00)),
        snap(1, 12, OfferState::Rented, dec!(1.00)),
        snap(1, 18, OfferState::Available, dec!(1.10)),
    ]
}

/// Counts store calls so tests can check which access paths were used.
#[derive(Default)]
struct CountingStore {
    inner: InMemorySnapshotStore,
    range_calls: AtomicUsize,
    point_calls: AtomicUsize,
}

impl CountingStore {
    fn new(records: Vec<SnapshotRecord>) -> Self {
        Self {
            inner: InMemorySnapshotStore::new(records),
            ..Default::default()
        }
    }
}

#[async_trait]
impl SnapshotStore for CountingStore {
    async fn snapshots_in_range(
        &self,
        window: &TimeWindow,
        filter: &SnapshotFilter,
    ) -> Result<Vec<SnapshotRecord>> {
        self.range_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.snapshots_in_range(window, filter).await
    }

    async fn distinct_timestamps(&self, window: &TimeWindow) -> Result<Vec<DateTime<Utc>>> {
        self.inner.distinct_timestamps(window).await
    }

    async fn snapshots_at(
        &self,
        first: DateTime<Utc>,
        second: DateTime<Utc>,
        filter: &SnapshotFilter,
    ) -> Result<Vec<SnapshotRecord>> {
        self.point_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.snapshots_at(first, second, filter).await
    }

    async fn latest_snapshot(&self, filter: &SnapshotFilter) -> Result<Vec<SnapshotRecord>> {
        self.inner.latest_snapshot(filter).await
    }

    async fn bounds(&self) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        self.inner.bounds().await
    }
}

/// A store whose backend is gone.
struct BrokenStore;

fn broken() -> OccupancyError {
    OccupancyError::store(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "connection refused",
    ))
}

#[async_trait]
impl SnapshotStore for BrokenStore {
    async fn snapshots_in_range(&self, _: &TimeWindow, _: &SnapshotFilter) -> Result<Vec<SnapshotRecord>> {
        Err(broken())
    }

    async fn distinct_timestamps(&self, _: &TimeWindow) -> Result<Vec<DateTime<Utc>>> {
        Err(broken())
    }

    async fn snapshots_at(
        &self,
        _: DateTime<Utc>,
        _: DateTime<Utc>,
        _: &SnapshotFilter,
    ) -> Result<Vec<SnapshotRecord>> {
        Err(broken())
    }

    async fn latest_snapshot(&self, _: &SnapshotFilter) -> Result<Vec<SnapshotRecord>> {
        Err(broken())
    }

    async fn bounds(&self) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        Err(broken())
    }
}

#[tokio::test]
async fn test_reference_scenario() {
    let store = InMemorySnapshotStore::new(scenario_records());
    let window = window(0, 24);

    let reconstructor = IntervalReconstructor::new(Duration::hours(6)).unwrap();
    let snapshots = store
        .snapshots_in_range(&window, &SnapshotFilter::new())
        .await
        .unwrap();
    let intervals = reconstructor.reconstruct_all(&snapshots, &window);

    let spans: Vec<(i64, i64, OfferState)> = intervals
        .iter()
        .map(|i| {
            (
                (i.start - at(0)).num_hours(),
                (i.end - at(0)).num_hours(),
                i.state,
            )
        })
        .collect();
    assert_eq!(
        spans,
        vec![
            (0, 6, OfferState::Available),
            (6, 12, OfferState::Rented),
            (12, 18, OfferState::Rented),
            (18, 24, OfferState::Available),
        ]
    );

    let groups = aggregate_occupancy(&intervals, |_| "E");
    let summary = groups["E"].summary();
    assert!((summary.total_duration - 24.0).abs() < 1e-12);
    assert!((summary.occupied_duration - 12.0).abs() < 1e-12);
    assert_eq!(summary.occupancy_ratio, Some(0.5));

    let transitions = TransitionDetector::new(&store)
        .detect(window, TransitionPattern::rented(), SnapshotFilter::new())
        .await
        .unwrap();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].at, at(6));
    assert_eq!(transitions[0].price_before, Some(dec!(1.00)));
}

#[tokio::test]
async fn test_interval_durations_partition_window() {
    let store = InMemorySnapshotStore::new(scenario_records());
    let reconstructor = IntervalReconstructor::from_secs(6 * 3600).unwrap();

    for (since, until) in [(0, 24), (3, 21), (0, 7), (6, 30)] {
        let window = window(since, until);
        let snapshots = store
            .snapshots_in_range(&window, &SnapshotFilter::new())
            .await
            .unwrap();
        let intervals = reconstructor.reconstruct_all(&snapshots, &window);

        let total = intervals
            .iter()
            .fold(Duration::zero(), |acc, i| acc + i.duration());
        let first = snapshots.first().map_or(window.until(), |s| s.timestamp);
        let last = snapshots.last().map_or(window.since(), |s| s.timestamp);
        let expected = (last + Duration::hours(6)).min(window.until()) - first.max(window.since());
        assert_eq!(total, expected, "window [{since}, {until})");

        for pair in intervals.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }
}

#[tokio::test]
async fn test_transition_symmetry_through_store() {
    let store = InMemorySnapshotStore::new(vec![
        snap(1, 1, OfferState::Available, dec!(0.40)),
        snap(1, 2, OfferState::Rented, dec!(0.45)),
        snap(1, 3, OfferState::Available, dec!(0.50)),
    ]);
    let detector = TransitionDetector::new(&store);
    let window = window(0, 4);

    let rented = detector
        .detect(window, TransitionPattern::rented(), SnapshotFilter::new())
        .await
        .unwrap();
    let released = detector
        .detect(window, TransitionPattern::released(), SnapshotFilter::new())
        .await
        .unwrap();

    assert_eq!(rented.len(), 1);
    assert_eq!((rented[0].at, rented[0].price_before), (at(2), Some(dec!(0.40))));
    assert_eq!(released.len(), 1);
    assert_eq!((released[0].at, released[0].price_before), (at(3), Some(dec!(0.45))));
}

#[tokio::test]
async fn test_transitions_use_point_lookups_per_cycle_pair() {
    let mut records = scenario_records();
    records.push(snap(2, 0, OfferState::Rented, dec!(2.00)));
    records.push(snap(2, 6, OfferState::Available, dec!(2.00)));
    records.push(snap(2, 12, OfferState::Rented, dec!(1.80)));
    let store = CountingStore::new(records);

    let transitions = TransitionDetector::new(&store)
        .detect(window(0, 24), TransitionPattern::rented(), SnapshotFilter::new())
        .await
        .unwrap();

    // Four cycles (0, 6, 12, 18) give three pairs.
    assert_eq!(store.point_calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.range_calls.load(Ordering::SeqCst), 0);

    let found: Vec<(i64, DateTime<Utc>)> = transitions
        .iter()
        .map(|t| (t.entity.offer_id, t.at))
        .collect();
    assert_eq!(found, vec![(1, at(6)), (2, at(12))]);
    assert_eq!(transitions[1].price_before, Some(dec!(2.00)));
}

#[tokio::test]
async fn test_transition_filter_applies_on_point_lookup() {
    let mut records = scenario_records();
    records.push(
        snap(2, 0, OfferState::Available, dec!(3.00))
            .with_attributes(OfferAttributes::new("H100 SXM", 8)),
    );
    records.push(
        snap(2, 6, OfferState::Rented, dec!(3.00))
            .with_attributes(OfferAttributes::new("H100 SXM", 8)),
    );
    let store = InMemorySnapshotStore::new(records);

    let filter = SnapshotFilter::new().with_gpu_names(["h100"]);
    let transitions = TransitionDetector::new(&store)
        .detect(window(0, 24), TransitionPattern::rented(), filter)
        .await
        .unwrap();

    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].entity.offer_id, 2);
    assert_eq!(transitions[0].attributes.num_gpus, 8);
}

#[tokio::test]
async fn test_entity_missing_from_window_is_absent() {
    let store = InMemorySnapshotStore::new(vec![
        snap(1, 0, OfferState::Rented, dec!(1)),
        snap(1, 6, OfferState::Rented, dec!(1)),
        snap(2, 30, OfferState::Rented, dec!(1)),
        snap(2, 36, OfferState::Rented, dec!(1)),
    ]);
    let query = OccupancyQuery::new(window(0, 12), Duration::hours(6));

    let rows = occupancy_by_offer(&store, &query).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].entity.offer_id, 1);

    let groups = occupancy_by(&store, &query, |attrs| attrs.num_gpus).await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[&1].entity_count(), 1);
}

#[tokio::test]
async fn test_only_unavailable_has_no_ratio() {
    let store = InMemorySnapshotStore::new(vec![
        snap(1, 0, OfferState::Unavailable, dec!(1)),
        snap(1, 6, OfferState::Unavailable, dec!(1)),
    ]);
    let query = OccupancyQuery::new(window(0, 12), Duration::hours(6));

    let rows = occupancy_by_offer(&store, &query).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].occupancy_ratio, None);
    assert!((rows[0].unavailable_pct - 100.0).abs() < 1e-9);

    let groups = occupancy_by_group(&store, &query, GroupDimension::Gpu)
        .await
        .unwrap();
    assert_eq!(groups[0].occupancy_ratio, None);
    assert_eq!(groups[0].total_hours, 0.0);
}

#[tokio::test]
async fn test_repeated_queries_are_identical() {
    let mut records = scenario_records();
    records.push(snap(2, 0, OfferState::Available, dec!(0.9)));
    records.push(snap(2, 12, OfferState::Rented, dec!(0.9)));
    let store = InMemorySnapshotStore::new(records);
    let query = OccupancyQuery::new(window(0, 24), Duration::hours(6));

    let first = occupancy_by_offer(&store, &query).await.unwrap();
    let second = occupancy_by_offer(&store, &query).await.unwrap();
    assert_eq!(first, second);

    let detector = TransitionDetector::new(&store);
    let a = detector
        .detect(window(0, 24), TransitionPattern::rented(), SnapshotFilter::new())
        .await
        .unwrap();
    let b = detector
        .detect(window(0, 24), TransitionPattern::rented(), SnapshotFilter::new())
        .await
        .unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_ratios_stay_within_bounds() {
    let states = [
        OfferState::Available,
        OfferState::Rented,
        OfferState::Unavailable,
        OfferState::Unknown,
    ];
    let mut records = Vec::new();
    for offer in 0..12_i64 {
        for cycle in 0..8_i64 {
            let state = states[((offer * 7 + cycle * 3 + offer * cycle) % 4) as usize];
            records.push(snap(offer, cycle, state, dec!(1)));
        }
    }
    let store = InMemorySnapshotStore::new(records);
    let query = OccupancyQuery::new(window(0, 9), Duration::hours(1)).with_min_samples(1);

    for row in occupancy_by_offer(&store, &query).await.unwrap() {
        if let Some(ratio) = row.occupancy_ratio {
            assert!((0.0..=1.0).contains(&ratio), "offer {} ratio {ratio}", row.entity);
        }
        let pct_sum = row.available_pct + row.rented_pct + row.unavailable_pct + row.unknown_pct;
        assert!((pct_sum - 100.0).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_min_samples_and_limit() {
    let store = InMemorySnapshotStore::new(vec![
        snap(1, 0, OfferState::Rented, dec!(1)),
        snap(2, 0, OfferState::Available, dec!(1)),
        snap(2, 6, OfferState::Rented, dec!(1)),
        snap(3, 0, OfferState::Rented, dec!(1)),
        snap(3, 6, OfferState::Rented, dec!(1)),
    ]);
    let base = OccupancyQuery::new(window(0, 12), Duration::hours(6));

    let rows = occupancy_by_offer(&store, &base).await.unwrap();
    let offers: Vec<i64> = rows.iter().map(|r| r.entity.offer_id).collect();
    assert_eq!(offers, vec![3, 2]);

    let rows = occupancy_by_offer(&store, &base.clone().with_min_samples(1).with_limit(1))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    let rows = occupancy_by_offer(&store, &base.with_min_total_minutes(24.0 * 60.0))
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_group_by_verification() {
    let verified = OfferAttributes::new("RTX 4090", 1).with_verification(Verification::Verified);
    let store = InMemorySnapshotStore::new(vec![
        snap(1, 0, OfferState::Rented, dec!(1)).with_attributes(verified.clone()),
        snap(1, 6, OfferState::Rented, dec!(1)).with_attributes(verified),
        snap(2, 0, OfferState::Available, dec!(1)),
        snap(2, 6, OfferState::Rented, dec!(1)),
    ]);
    let query = OccupancyQuery::new(window(0, 12), Duration::hours(6));

    let rows = occupancy_by_group(&store, &query, GroupDimension::Verification)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].group, "verified");
    assert_eq!(rows[0].occupancy_ratio, Some(1.0));
    assert_eq!(rows[1].group, "unverified");
    assert_eq!(rows[1].occupancy_ratio, Some(0.5));
}

#[tokio::test]
async fn test_default_window_from_bounds() {
    let store = InMemorySnapshotStore::new(scenario_records());
    let poll = Duration::minutes(6);

    let resolved = default_window(&store, None, None, poll).await.unwrap().unwrap();
    assert_eq!(resolved.since(), at(0));
    assert_eq!(resolved.until(), at(18) + poll);

    let err = default_window(&store, Some(at(30)), None, poll).await.unwrap_err();
    assert!(matches!(err, OccupancyError::InvalidRange { .. }));

    let empty = InMemorySnapshotStore::default();
    assert!(default_window(&empty, None, None, poll).await.unwrap().is_none());
}

#[tokio::test]
async fn test_store_failure_propagates() {
    let query = OccupancyQuery::new(window(0, 24), Duration::hours(6));
    let err = occupancy_by_offer(&BrokenStore, &query).await.unwrap_err();
    assert!(err.is_store_failure());

    let mut stream = Box::pin(TransitionDetector::new(&BrokenStore).stream(
        window(0, 24),
        TransitionPattern::rented(),
        SnapshotFilter::new(),
    ));
    let first = stream.next().await.unwrap();
    assert!(first.unwrap_err().is_store_failure());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_huge_poll_interval_keeps_window_open_ended() {
    let store = InMemorySnapshotStore::new(vec![snap(1, 0, OfferState::Rented, dec!(1))]);
    let poll = IntervalReconstructor::from_secs(u64::MAX).unwrap().poll_interval();

    let window = default_window(&store, None, None, poll).await.unwrap().unwrap();
    assert_eq!(window.since(), at(0));
    assert_eq!(window.until(), DateTime::<Utc>::MAX_UTC);

    let query = OccupancyQuery::new(window, poll).with_min_samples(1);
    let rows = occupancy_by_offer(&store, &query).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].occupancy_ratio, Some(1.0));
}
