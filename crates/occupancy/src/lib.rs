//! Occupancy analytics over recorded offer snapshots.
//!
//! The engine is read-only: it reconstructs per-offer state intervals from
//! discrete snapshots, aggregates them into occupancy per group, and detects
//! state transitions (clearing prices) with a two-phase store lookup.

pub mod aggregate;
pub mod interval;
pub mod report;
pub mod stats;
pub mod transition;

pub use aggregate::{
    aggregate_occupancy, GroupOccupancy, OccupancyAggregator, OccupancySummary, StateDurations,
};
pub use interval::{entity_runs, Interval, IntervalReconstructor};
pub use stats::PriceSummary;
pub use transition::{
    detect_in_sequence, pair_transitions, Transition, TransitionDetector, TransitionPattern,
};
