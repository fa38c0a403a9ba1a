//! Occupancy reports over a time window.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use vastwatch_core::{
    EntityKey, OfferAttributes, OfferState, Result, SnapshotFilter, SnapshotStore, TimeWindow,
};

use crate::aggregate::{GroupOccupancy, OccupancyAggregator};
use crate::interval::{entity_runs, Interval, IntervalReconstructor};
use crate::report::dimension::GroupDimension;

/// Parameters of an occupancy report.
#[derive(Debug, Clone)]
pub struct OccupancyQuery {
    pub window: TimeWindow,
    pub poll_interval: Duration,
    pub filter: SnapshotFilter,
    /// Offers with fewer snapshots in the window are skipped
    pub min_samples: usize,
    /// Offers observed for less time are skipped
    pub min_total_minutes: f64,
    pub limit: Option<usize>,
}

impl OccupancyQuery {
    #[must_use]
    pub fn new(window: TimeWindow, poll_interval: Duration) -> Self {
        Self {
            window,
            poll_interval,
            filter: SnapshotFilter::default(),
            min_samples: 2,
            min_total_minutes: 0.0,
            limit: None,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: SnapshotFilter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    #[must_use]
    pub fn with_min_total_minutes(mut self, minutes: f64) -> Self {
        self.min_total_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn keeps(&self, samples: usize, occupancy: &GroupOccupancy) -> bool {
        let observed = occupancy.durations().observed();
        samples >= self.min_samples.max(1)
            && observed > Duration::zero()
            && occupancy.observed_hours() * 60.0 >= self.min_total_minutes.max(0.0)
    }
}

/// Resolves a report window against the store's bounds.
///
/// `since` defaults to the earliest snapshot and `until` to one poll interval
/// past the latest. Returns `None` when the store is empty.
///
/// # Errors
/// Returns `InvalidRange` if the resolved `until <= since`, or the store's error.
pub async fn default_window<S>(
    store: &S,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    poll_interval: Duration,
) -> Result<Option<TimeWindow>>
where
    S: SnapshotStore + ?Sized,
{
    let Some((earliest, latest)) = store.bounds().await? else {
        return Ok(None);
    };
    let since = since.unwrap_or(earliest);
    let until = until.unwrap_or_else(|| {
        latest
            .checked_add_signed(poll_interval)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    });
    TimeWindow::new(since, until).map(Some)
}

/// Occupancy of one offer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferOccupancyRow {
    pub entity: EntityKey,
    /// Attributes from the offer's last snapshot in the window
    pub attributes: OfferAttributes,
    pub samples: usize,
    /// Hours observed in any state
    pub total_hours: f64,
    pub available_hours: f64,
    pub rented_hours: f64,
    pub unavailable_hours: f64,
    pub unknown_hours: f64,
    pub available_pct: f64,
    pub rented_pct: f64,
    pub unavailable_pct: f64,
    pub unknown_pct: f64,
    /// Rented / (available + rented)
    pub occupancy_ratio: Option<f64>,
}

impl OfferOccupancyRow {
    fn new(
        entity: EntityKey,
        attributes: OfferAttributes,
        samples: usize,
        occupancy: &GroupOccupancy,
    ) -> Self {
        let pct = |state| occupancy.state_share(state).unwrap_or(0.0) * 100.0;
        Self {
            entity,
            attributes,
            samples,
            total_hours: occupancy.observed_hours(),
            available_hours: occupancy.state_hours(OfferState::Available),
            rented_hours: occupancy.state_hours(OfferState::Rented),
            unavailable_hours: occupancy.state_hours(OfferState::Unavailable),
            unknown_hours: occupancy.state_hours(OfferState::Unknown),
            available_pct: pct(OfferState::Available),
            rented_pct: pct(OfferState::Rented),
            unavailable_pct: pct(OfferState::Unavailable),
            unknown_pct: pct(OfferState::Unknown),
            occupancy_ratio: occupancy.occupancy_ratio(),
        }
    }
}

/// One offer's intervals in the window, with its sample count and last attributes.
struct EntityOccupancy {
    entity: EntityKey,
    attributes: OfferAttributes,
    samples: usize,
    intervals: Vec<Interval>,
    occupancy: GroupOccupancy,
}

async fn entity_occupancy<S>(store: &S, query: &OccupancyQuery) -> Result<Vec<EntityOccupancy>>
where
    S: SnapshotStore + ?Sized,
{
    let reconstructor = IntervalReconstructor::new(query.poll_interval)?;
    let snapshots = store
        .snapshots_in_range(&query.window, &query.filter)
        .await?;

    tracing::debug!(
        rows = snapshots.len(),
        since = %query.window.since(),
        until = %query.window.until(),
        "Loaded snapshots for occupancy"
    );

    let mut out = Vec::new();
    for run in entity_runs(&snapshots) {
        let Some(last) = run.last() else { continue };
        let intervals = reconstructor.reconstruct(run, &query.window);
        let mut occupancy = GroupOccupancy::default();
        for interval in &intervals {
            occupancy.add(interval);
        }
        if !query.keeps(run.len(), &occupancy) {
            continue;
        }
        out.push(EntityOccupancy {
            entity: last.entity,
            attributes: last.attributes.clone(),
            samples: run.len(),
            intervals,
            occupancy,
        });
    }
    Ok(out)
}

/// Per-offer occupancy, busiest first.
///
/// Rows are ordered by rented share, then rented hours, both descending.
///
/// # Errors
/// Returns `InvalidPollInterval` or the store's error.
pub async fn occupancy_by_offer<S>(store: &S, query: &OccupancyQuery) -> Result<Vec<OfferOccupancyRow>>
where
    S: SnapshotStore + ?Sized,
{
    let mut rows: Vec<OfferOccupancyRow> = entity_occupancy(store, query)
        .await?
        .into_iter()
        .map(|e| OfferOccupancyRow::new(e.entity, e.attributes, e.samples, &e.occupancy))
        .collect();

    rows.sort_by(|a, b| {
        desc(a.rented_pct, b.rented_pct)
            .then_with(|| desc(a.rented_hours, b.rented_hours))
            .then_with(|| a.entity.cmp(&b.entity))
    });
    if let Some(limit) = query.limit {
        rows.truncate(limit);
    }
    Ok(rows)
}

/// Occupancy grouped by an arbitrary key derived from offer attributes.
///
/// Groups with no qualifying offer are absent.
///
/// # Errors
/// Returns `InvalidPollInterval` or the store's error.
pub async fn occupancy_by<S, K, F>(
    store: &S,
    query: &OccupancyQuery,
    mut group_of: F,
) -> Result<BTreeMap<K, GroupOccupancy>>
where
    S: SnapshotStore + ?Sized,
    K: Ord + Clone,
    F: FnMut(&OfferAttributes) -> K,
{
    let mut aggregator = OccupancyAggregator::new();
    for entity in entity_occupancy(store, query).await? {
        let key = group_of(&entity.attributes);
        for interval in &entity.intervals {
            aggregator.add(key.clone(), interval);
        }
    }

    Ok(aggregator.finish())
}

/// Occupancy of one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupOccupancyRow {
    pub group: String,
    pub offers: usize,
    pub total_hours: f64,
    pub occupied_hours: f64,
    pub unavailable_hours: f64,
    pub occupancy_ratio: Option<f64>,
}

/// Occupancy grouped by a report dimension, highest ratio first.
///
/// # Errors
/// Returns `InvalidPollInterval` or the store's error.
pub async fn occupancy_by_group<S>(
    store: &S,
    query: &OccupancyQuery,
    dimension: GroupDimension,
) -> Result<Vec<GroupOccupancyRow>>
where
    S: SnapshotStore + ?Sized,
{
    let groups = occupancy_by(store, query, |attrs| dimension.label(attrs)).await?;

    let mut rows: Vec<GroupOccupancyRow> = groups
        .into_iter()
        .map(|(group, occupancy)| GroupOccupancyRow {
            group,
            offers: occupancy.entity_count(),
            total_hours: occupancy.total_hours(),
            occupied_hours: occupancy.occupied_hours(),
            unavailable_hours: occupancy.state_hours(OfferState::Unavailable),
            occupancy_ratio: occupancy.occupancy_ratio(),
        })
        .collect();

    rows.sort_by(|a, b| {
        desc_opt(a.occupancy_ratio, b.occupancy_ratio).then_with(|| a.group.cmp(&b.group))
    });
    if let Some(limit) = query.limit {
        rows.truncate(limit);
    }
    Ok(rows)
}

fn desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Descending with `None` last.
fn desc_opt(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => desc(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
