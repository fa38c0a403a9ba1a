//! Database repositories for offer snapshots.
//!
//! Repositories provide typed access to a table with batch insert
//! capabilities and time-range queries.

pub mod offer_snapshot_repo;

pub use offer_snapshot_repo::OfferSnapshotRepository;
