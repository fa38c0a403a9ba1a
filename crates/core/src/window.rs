//! Half-open query windows and duration helpers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OccupancyError, Result};

/// A half-open time window `[since, until)`.
///
/// Construction fails when `until <= since`, so every window in circulation
/// has positive length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    since: DateTime<Utc>,
    until: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a window.
    ///
    /// # Errors
    /// Returns `InvalidRange` if `until <= since`.
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Self> {
        if until <= since {
            return Err(OccupancyError::invalid_range(since, until));
        }
        Ok(Self { since, until })
    }

    /// Inclusive start.
    #[must_use]
    pub fn since(&self) -> DateTime<Utc> {
        self.since
    }

    /// Exclusive end.
    #[must_use]
    pub fn until(&self) -> DateTime<Utc> {
        self.until
    }

    /// Returns true if `ts` falls inside the window.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.since && ts < self.until
    }

    /// Window length.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.until - self.since
    }
}

/// Converts a duration to fractional hours.
///
/// Microsecond precision is kept whenever it fits in an `i64`.
#[must_use]
pub fn duration_hours(duration: Duration) -> f64 {
    match duration.num_microseconds() {
        Some(us) => us as f64 / 3_600_000_000.0,
        None => duration.num_milliseconds() as f64 / 3_600_000.0,
    }
}
