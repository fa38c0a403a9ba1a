//! Offer snapshot data model.
//!
//! One row per offer per poll cycle, as normalized from the marketplace
//! listing. The `state` column is the only occupancy signal the engine reads;
//! the raw `rentable`/`rented` flags are kept for auditing.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vastwatch_core::{EntityKey, OfferAttributes, OfferState, SnapshotRecord, Verification};

/// A stored offer snapshot (`offer_snapshots` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OfferSnapshotRecord {
    /// Poll cycle timestamp, second precision
    pub timestamp: DateTime<Utc>,
    /// Marketplace offer id
    pub offer_id: i64,
    /// Host machine id
    pub machine_id: i64,
    /// GPU model name
    pub gpu_name: Option<String>,
    /// GPUs in the offer
    pub num_gpus: i32,
    /// Fraction of the machine's GPUs in the offer
    pub gpu_frac: Option<f64>,
    /// Total GPU memory in GB
    pub gpu_total_ram_gb: Option<f64>,
    /// Total price in USD per hour
    pub price_per_hour: Option<Decimal>,
    /// Host reliability score (0.0 to 1.0)
    pub reliability: Option<f64>,
    /// Host location
    pub geolocation: Option<String>,
    /// "on-demand" or "interruptible"
    pub offer_type: Option<String>,
    /// Raw rentable flag from the listing
    pub rentable: Option<bool>,
    /// Raw rented flag from the listing
    pub rented: Option<bool>,
    pub verified: bool,
    pub deverified: bool,
    /// available | rented | unavailable | unknown
    pub state: String,
}

impl OfferSnapshotRecord {
    /// Creates a record with only identity, state, and GPU count set.
    pub fn new(
        timestamp: DateTime<Utc>,
        offer_id: i64,
        machine_id: i64,
        state: OfferState,
    ) -> Self {
        Self {
            timestamp,
            offer_id,
            machine_id,
            gpu_name: None,
            num_gpus: 1,
            gpu_frac: None,
            gpu_total_ram_gb: None,
            price_per_hour: None,
            reliability: None,
            geolocation: None,
            offer_type: None,
            rentable: None,
            rented: None,
            verified: false,
            deverified: false,
            state: state.to_string(),
        }
    }

    /// Sets GPU model and count.
    #[must_use]
    pub fn with_gpu(mut self, gpu_name: impl Into<String>, num_gpus: i32) -> Self {
        self.gpu_name = Some(gpu_name.into());
        self.num_gpus = num_gpus;
        self
    }

    /// Sets the hourly price.
    #[must_use]
    pub fn with_price(mut self, price_per_hour: Decimal) -> Self {
        self.price_per_hour = Some(price_per_hour);
        self
    }

    /// Parsed availability state; unrecognised labels read as `Unknown`.
    #[must_use]
    pub fn offer_state(&self) -> OfferState {
        OfferState::from_label(&self.state)
    }

    #[must_use]
    pub fn verification(&self) -> Verification {
        Verification::from_flags(self.verified, self.deverified)
    }

    #[must_use]
    pub fn entity(&self) -> EntityKey {
        EntityKey::new(self.offer_id, self.machine_id)
    }

    /// Converts to the engine's snapshot record.
    #[must_use]
    pub fn to_snapshot(&self) -> SnapshotRecord {
        let attributes = OfferAttributes {
            gpu_name: self.gpu_name.clone(),
            num_gpus: self.num_gpus,
            geolocation: self.geolocation.clone(),
            verification: self.verification(),
        };
        SnapshotRecord {
            entity: self.entity(),
            timestamp: self.timestamp,
            state: self.offer_state(),
            price: self.price_per_hour,
            attributes,
        }
    }
}

impl From<OfferSnapshotRecord> for SnapshotRecord {
    fn from(record: OfferSnapshotRecord) -> Self {
        record.to_snapshot()
    }
}
