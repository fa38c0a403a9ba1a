//! Occupancy aggregation over reconstructed intervals.
//!
//! Durations are summed exactly as `chrono::Duration` and only converted to
//! fractional hours when read, so many short intervals never accumulate
//! rounding error. UNAVAILABLE and UNKNOWN time is tracked but kept out of
//! the occupancy denominator.

use chrono::Duration;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use vastwatch_core::{duration_hours, EntityKey, OfferState};

use crate::interval::Interval;

/// Summed interval durations per state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateDurations {
    pub available: Duration,
    pub rented: Duration,
    pub unavailable: Duration,
    pub unknown: Duration,
}

impl Default for StateDurations {
    fn default() -> Self {
        Self {
            available: Duration::zero(),
            rented: Duration::zero(),
            unavailable: Duration::zero(),
            unknown: Duration::zero(),
        }
    }
}

impl StateDurations {
    /// Adds time spent in `state`.
    pub fn add(&mut self, state: OfferState, duration: Duration) {
        let slot = match state {
            OfferState::Available => &mut self.available,
            OfferState::Rented => &mut self.rented,
            OfferState::Unavailable => &mut self.unavailable,
            OfferState::Unknown => &mut self.unknown,
        };
        *slot = *slot + duration;
    }

    /// Time spent in `state`.
    #[must_use]
    pub fn get(&self, state: OfferState) -> Duration {
        match state {
            OfferState::Available => self.available,
            OfferState::Rented => self.rented,
            OfferState::Unavailable => self.unavailable,
            OfferState::Unknown => self.unknown,
        }
    }

    /// Time observed in any state.
    #[must_use]
    pub fn observed(&self) -> Duration {
        self.available + self.rented + self.unavailable + self.unknown
    }
}

/// Occupancy accumulated for one group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupOccupancy {
    durations: StateDurations,
    interval_count: usize,
    entities: BTreeSet<EntityKey>,
}

impl GroupOccupancy {
    /// Adds one interval.
    pub fn add(&mut self, interval: &Interval) {
        self.durations.add(interval.state, interval.duration());
        self.interval_count += 1;
        self.entities.insert(interval.entity);
    }

    #[must_use]
    pub fn durations(&self) -> &StateDurations {
        &self.durations
    }

    #[must_use]
    pub fn interval_count(&self) -> usize {
        self.interval_count
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// AVAILABLE + RENTED time.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.durations.available + self.durations.rented
    }

    /// RENTED time.
    #[must_use]
    pub fn occupied_duration(&self) -> Duration {
        self.durations.rented
    }

    #[must_use]
    pub fn total_hours(&self) -> f64 {
        duration_hours(self.total_duration())
    }

    #[must_use]
    pub fn occupied_hours(&self) -> f64 {
        duration_hours(self.occupied_duration())
    }

    /// Hours spent in `state`.
    #[must_use]
    pub fn state_hours(&self, state: OfferState) -> f64 {
        duration_hours(self.durations.get(state))
    }

    /// Hours observed in any state, including excluded ones.
    #[must_use]
    pub fn observed_hours(&self) -> f64 {
        duration_hours(self.durations.observed())
    }

    /// Occupied / total, or `None` when the group has no AVAILABLE or RENTED time.
    #[must_use]
    pub fn occupancy_ratio(&self) -> Option<f64> {
        let total = self.total_duration();
        if total <= Duration::zero() {
            return None;
        }
        Some(duration_hours(self.occupied_duration()) / duration_hours(total))
    }

    /// Fraction of all observed time spent in `state`, or `None` if nothing was observed.
    #[must_use]
    pub fn state_share(&self, state: OfferState) -> Option<f64> {
        let observed = self.durations.observed();
        if observed <= Duration::zero() {
            return None;
        }
        Some(duration_hours(self.durations.get(state)) / duration_hours(observed))
    }

    #[must_use]
    pub fn summary(&self) -> OccupancySummary {
        OccupancySummary {
            total_duration: self.total_hours(),
            occupied_duration: self.occupied_hours(),
            occupancy_ratio: self.occupancy_ratio(),
        }
    }
}

/// Output contract of an occupancy query, durations in hours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OccupancySummary {
    pub total_duration: f64,
    pub occupied_duration: f64,
    pub occupancy_ratio: Option<f64>,
}

/// Accumulates intervals into per-group occupancy.
#[derive(Debug, Clone)]
pub struct OccupancyAggregator<K: Ord> {
    groups: BTreeMap<K, GroupOccupancy>,
}

impl<K: Ord> Default for OccupancyAggregator<K> {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }
}

impl<K: Ord> OccupancyAggregator<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an interval to `key`'s group.
    pub fn add(&mut self, key: K, interval: &Interval) {
        self.groups.entry(key).or_default().add(interval);
    }

    #[must_use]
    pub fn finish(self) -> BTreeMap<K, GroupOccupancy> {
        self.groups
    }
}

/// Aggregates intervals by the group key `group_of` assigns to each entity.
///
/// Groups appear only if at least one interval maps to them.
pub fn aggregate_occupancy<'a, K, I, F>(intervals: I, mut group_of: F) -> BTreeMap<K, GroupOccupancy>
where
    K: Ord,
    I: IntoIterator<Item = &'a Interval>,
    F: FnMut(&EntityKey) -> K,
{
    let mut aggregator = OccupancyAggregator::new();
    for interval in intervals {
        aggregator.add(group_of(&interval.entity), interval);
    }
    aggregator.finish()
}
