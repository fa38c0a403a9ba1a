//! Snapshot storage for GPU market occupancy tracking.
//!
//! This crate provides:
//! - Database client and schema for `PostgreSQL`
//! - The stored offer snapshot model
//! - A repository implementing the engine's `SnapshotStore`
//! - CSV import and export

pub mod csv_storage;
pub mod database;
pub mod models;
pub mod repositories;

pub use csv_storage::CsvStorage;
pub use database::{DatabaseClient, SCHEMA};
pub use models::{DataStatus, OfferSnapshotRecord};
pub use repositories::OfferSnapshotRepository;
