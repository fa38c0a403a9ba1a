//! Core types for GPU rental market occupancy tracking.
//!
//! This crate provides:
//! - Snapshot records and the four-state offer model
//! - The read-only `SnapshotStore` trait and an in-memory implementation
//! - Query windows, grouping filters, and error types
//! - Application configuration loading

pub mod config;
pub mod config_loader;
pub mod error;
pub mod filter;
pub mod memory_store;
pub mod snapshot;
pub mod traits;
pub mod window;

pub use config::{
    AppConfig, CollectorConfig, DatabaseConfig, ReportConfig, VastConfig, MIN_POLL_INTERVAL_SECS,
    VAST_MIN_POLL_INTERVAL_SECS,
};
pub use config_loader::{ConfigLoader, DEFAULT_CONFIG_PATH};
pub use error::{OccupancyError, Result};
pub use filter::SnapshotFilter;
pub use memory_store::InMemorySnapshotStore;
pub use snapshot::{EntityKey, OfferAttributes, OfferState, SnapshotRecord, Verification};
pub use traits::SnapshotStore;
pub use window::{duration_hours, TimeWindow};
