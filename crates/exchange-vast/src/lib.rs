//! Vast.ai marketplace integration for occupancy tracking.
//!
//! This crate provides:
//! - Search-offers client with rate limiting, retry and backoff
//! - Normalization of raw offers into stored snapshot rows
//! - A collector that polls the market once per cycle and emits batches
//!
//! # Example
//!
//! ```ignore
//! use tokio::sync::mpsc;
//! use vastwatch_vast::{SnapshotCollector, SnapshotCollectorConfig, VastClient, VastClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = VastClient::new(VastClientConfig::default().with_api_key("..."))?;
//!     let (tx, mut rx) = mpsc::channel(4);
//!     let mut collector = SnapshotCollector::new(client, SnapshotCollectorConfig::default(), tx);
//!     tokio::spawn(async move { collector.run().await });
//!
//!     while let Some(batch) = rx.recv().await {
//!         println!("{} rows", batch.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Authentication
//!
//! Requests carry `Authorization: Bearer <key>`. The CLI reads the key from
//! `VAST_API_KEY` or the `[vast]` configuration section.

pub mod client;
pub mod collector;
pub mod error;
pub mod models;

pub use client::{OfferQuery, OfferSource, VastClient, VastClientConfig};
pub use collector::{
    CollectorEvent, CollectorStats, CycleCounts, SnapshotCollector, SnapshotCollectorConfig,
};
pub use error::{Result, VastError};
pub use models::normalize_offer;
