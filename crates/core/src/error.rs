//! Error types for occupancy and transition queries.
//!
//! Absence of data is never an error: empty windows, missing entities and
//! groups with no qualifying time all surface as empty or `None` results.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Boxed error produced by a snapshot store backend.
pub type StoreSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while answering an occupancy or transition query.
#[derive(Debug, Error)]
pub enum OccupancyError {
    /// The requested window is empty or inverted.
    #[error("invalid range: until ({until}) must be later than since ({since})")]
    InvalidRange {
        /// Inclusive start of the requested window.
        since: DateTime<Utc>,
        /// Exclusive end of the requested window.
        until: DateTime<Utc>,
    },

    /// The tail-extrapolation horizon is zero or negative.
    #[error("invalid poll interval: {seconds}s (must be positive)")]
    InvalidPollInterval {
        /// Offending interval in seconds.
        seconds: i64,
    },

    /// A transition pattern whose two states are identical.
    #[error("invalid transition pattern: {state} -> {state}")]
    InvalidPattern {
        /// The repeated state.
        state: String,
    },

    /// An offer state label that is not part of the closed enumeration.
    #[error("unknown offer state: {0}")]
    InvalidState(String),

    /// The underlying snapshot store failed; propagated without retry.
    #[error("snapshot store unavailable: {source}")]
    StoreUnavailable {
        /// Backend error.
        #[source]
        source: StoreSource,
    },
}

impl OccupancyError {
    /// Creates an invalid range error.
    pub fn invalid_range(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self::InvalidRange { since, until }
    }

    /// Wraps a backend error as a store failure.
    pub fn store(source: impl Into<StoreSource>) -> Self {
        Self::StoreUnavailable {
            source: source.into(),
        }
    }

    /// Returns true if the error came from the store rather than from the query.
    #[must_use]
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}

/// Result type alias for occupancy operations.
pub type Result<T> = std::result::Result<T, OccupancyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_invalid_range_display() {
        let since = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let err = OccupancyError::invalid_range(since, since);
        let display = err.to_string();
        assert!(display.contains("invalid range"));
        assert!(display.contains("2025-03-01"));
        assert!(!err.is_store_failure());
    }

    #[test]
    fn test_store_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "db down");
        let err = OccupancyError::store(io);
        assert!(err.is_store_failure());
        assert!(err.to_string().contains("db down"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_invalid_pattern_display() {
        let err = OccupancyError::InvalidPattern {
            state: "rented".to_string(),
        };
        assert_eq!(err.to_string(), "invalid transition pattern: rented -> rented");
    }
}
