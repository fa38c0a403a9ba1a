//! Data models for stored offer snapshots.
//!
//! Models derive `sqlx::FromRow` for database compatibility and serde for CSV
//! import and export.

pub mod data_status;
pub mod offer_snapshot;

pub use data_status::DataStatus;
pub use offer_snapshot::OfferSnapshotRecord;
