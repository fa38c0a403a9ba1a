//! Snapshot record model.
//!
//! A snapshot is one observation of one offer at one poll cycle. Records are
//! immutable once produced by the ingestion boundary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::OccupancyError;

/// Availability state of an offer at a single snapshot.
///
/// This is the only occupancy signal the engine reads. Legacy boolean
/// rented/rentable flags are mapped onto it at ingestion and never consulted
/// afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferState {
    /// Listed and rentable.
    Available,
    /// Rented by a customer.
    Rented,
    /// Withdrawn from the market by the host.
    Unavailable,
    /// Not classifiable from the raw listing.
    Unknown,
}

impl OfferState {
    /// Returns all states in display order.
    #[must_use]
    pub fn all() -> [OfferState; 4] {
        [
            OfferState::Available,
            OfferState::Rented,
            OfferState::Unavailable,
            OfferState::Unknown,
        ]
    }

    /// Returns the state name as stored and displayed.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferState::Available => "available",
            OfferState::Rented => "rented",
            OfferState::Unavailable => "unavailable",
            OfferState::Unknown => "unknown",
        }
    }

    /// Returns true if time spent in this state belongs to the occupancy denominator.
    #[must_use]
    pub fn counts_toward_occupancy(&self) -> bool {
        matches!(self, OfferState::Available | OfferState::Rented)
    }

    /// Parses a stored label, mapping anything unrecognised to `Unknown`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or(OfferState::Unknown)
    }
}

impl fmt::Display for OfferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfferState {
    type Err = OccupancyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(OfferState::Available),
            "rented" => Ok(OfferState::Rented),
            "unavailable" => Ok(OfferState::Unavailable),
            "unknown" => Ok(OfferState::Unknown),
            other => Err(OccupancyError::InvalidState(other.to_string())),
        }
    }
}

/// Host verification tier reported by the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verification {
    Verified,
    Unverified,
    Deverified,
}

impl Verification {
    /// Derives the tier from the stored verified/deverified flags.
    ///
    /// Deverification wins over a stale verified flag.
    #[must_use]
    pub fn from_flags(verified: bool, deverified: bool) -> Self {
        if deverified {
            Verification::Deverified
        } else if verified {
            Verification::Verified
        } else {
            Verification::Unverified
        }
    }

    /// Returns the tier name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Verification::Verified => "verified",
            Verification::Unverified => "unverified",
            Verification::Deverified => "deverified",
        }
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verified" => Ok(Verification::Verified),
            "unverified" => Ok(Verification::Unverified),
            "deverified" => Ok(Verification::Deverified),
            other => Err(format!("unknown verification tier: {other}")),
        }
    }
}

/// Temporal identity of an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    /// Marketplace offer ID
    pub offer_id: i64,
    /// Host machine ID
    pub machine_id: i64,
}

impl EntityKey {
    /// Creates a new entity key.
    #[must_use]
    pub fn new(offer_id: i64, machine_id: i64) -> Self {
        Self {
            offer_id,
            machine_id,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.offer_id, self.machine_id)
    }
}

/// Grouping attributes that travel with each snapshot.
///
/// These are not part of temporal identity: an offer keeps its identity when
/// the host edits its listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferAttributes {
    /// GPU model name (e.g. "RTX 4090")
    pub gpu_name: Option<String>,
    /// Number of GPUs in the offer
    pub num_gpus: i32,
    /// Host location as reported by the marketplace
    pub geolocation: Option<String>,
    /// Host verification tier
    pub verification: Verification,
}

impl Default for OfferAttributes {
    fn default() -> Self {
        Self {
            gpu_name: None,
            num_gpus: 1,
            geolocation: None,
            verification: Verification::Unverified,
        }
    }
}

impl OfferAttributes {
    /// Creates attributes for a GPU model with a GPU count.
    #[must_use]
    pub fn new(gpu_name: impl Into<String>, num_gpus: i32) -> Self {
        Self {
            gpu_name: Some(gpu_name.into()),
            num_gpus,
            ..Default::default()
        }
    }

    /// Sets the geolocation.
    #[must_use]
    pub fn with_geolocation(mut self, geolocation: impl Into<String>) -> Self {
        self.geolocation = Some(geolocation.into());
        self
    }

    /// Sets the verification tier.
    #[must_use]
    pub fn with_verification(mut self, verification: Verification) -> Self {
        self.verification = verification;
        self
    }
}

/// One observation of one offer at one poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Offer identity
    pub entity: EntityKey,
    /// Poll cycle timestamp, shared by every row of the cycle
    pub timestamp: DateTime<Utc>,
    /// Availability state
    pub state: OfferState,
    /// Price in USD per hour, if listed
    pub price: Option<Decimal>,
    /// Grouping attributes
    pub attributes: OfferAttributes,
}

impl SnapshotRecord {
    /// Creates a snapshot with default attributes and no price.
    #[must_use]
    pub fn new(entity: EntityKey, timestamp: DateTime<Utc>, state: OfferState) -> Self {
        Self {
            entity,
            timestamp,
            state,
            price: None,
            attributes: OfferAttributes::default(),
        }
    }

    /// Sets the listed price.
    #[must_use]
    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    /// Sets the grouping attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: OfferAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}
