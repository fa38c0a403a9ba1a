//! Offer snapshot repository.
//!
//! Batch inserts for the collector and the read paths the occupancy engine
//! needs: filtered range scans, distinct poll timestamps, two-timestamp point
//! lookups, and the latest cycle. Grouping filters are always bound
//! parameters.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use vastwatch_core::{
    OccupancyError, SnapshotFilter, SnapshotRecord, SnapshotStore, TimeWindow,
};

use crate::models::{DataStatus, OfferSnapshotRecord};

const SELECT_COLUMNS: &str = r"
    SELECT timestamp, offer_id, machine_id, gpu_name, num_gpus, gpu_frac,
           gpu_total_ram_gb, price_per_hour, reliability, geolocation, offer_type,
           rentable, rented, verified, deverified, state
    FROM offer_snapshots
";

/// Filter predicate over bind parameters `$1` (name patterns), `$2` (GPU
/// counts) and `$3` (verification tier). A NULL parameter disables its clause.
const FILTER_CLAUSE: &str = r"
    ($1::text[] IS NULL OR gpu_name ILIKE ANY($1))
    AND ($2::int4[] IS NULL OR num_gpus = ANY($2))
    AND ($3::text IS NULL OR
         (CASE WHEN deverified THEN 'deverified'
               WHEN verified THEN 'verified'
               ELSE 'unverified' END) = $3)
";

/// Bind values for `FILTER_CLAUSE`.
struct FilterParams {
    name_patterns: Option<Vec<String>>,
    gpu_counts: Option<Vec<i32>>,
    verification: Option<String>,
}

impl From<&SnapshotFilter> for FilterParams {
    fn from(filter: &SnapshotFilter) -> Self {
        Self {
            name_patterns: Some(filter.gpu_name_patterns()).filter(|p| !p.is_empty()),
            gpu_counts: Some(filter.gpu_counts.clone()).filter(|c| !c.is_empty()),
            verification: filter.verification.map(|v| v.as_str().to_string()),
        }
    }
}

/// Repository for offer snapshot operations.
#[derive(Debug, Clone)]
pub struct OfferSnapshotRepository {
    pool: PgPool,
}

impl OfferSnapshotRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts one poll cycle's records in a single transaction.
    ///
    /// Duplicate `(timestamp, offer_id)` rows are skipped, so an offer returned
    /// by two queries of the same cycle is stored once.
    ///
    /// # Returns
    /// The number of rows actually inserted.
    ///
    /// # Errors
    /// Returns an error if the database transaction fails.
    pub async fn insert_batch(&self, records: &[OfferSnapshotRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        let mut inserted = 0u64;

        for record in records {
            let result = sqlx::query(
                r"
                INSERT INTO offer_snapshots
                (timestamp, offer_id, machine_id, gpu_name, num_gpus, gpu_frac,
                 gpu_total_ram_gb, price_per_hour, reliability, geolocation, offer_type,
                 rentable, rented, verified, deverified, state)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                ON CONFLICT (timestamp, offer_id) DO NOTHING
                ",
            )
            .bind(record.timestamp)
            .bind(record.offer_id)
            .bind(record.machine_id)
            .bind(&record.gpu_name)
            .bind(record.num_gpus)
            .bind(record.gpu_frac)
            .bind(record.gpu_total_ram_gb)
            .bind(record.price_per_hour)
            .bind(record.reliability)
            .bind(&record.geolocation)
            .bind(&record.offer_type)
            .bind(record.rentable)
            .bind(record.rented)
            .bind(record.verified)
            .bind(record.deverified)
            .bind(&record.state)
            .execute(&mut *tx)
            .await
            .context("Failed to insert offer snapshot")?;

            inserted += result.rows_affected();
        }

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(inserted)
    }

    /// Queries snapshots with `since <= timestamp < until`, ordered by
    /// `(offer_id, machine_id, timestamp)`.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn query_range(
        &self,
        window: &TimeWindow,
        filter: &SnapshotFilter,
    ) -> Result<Vec<OfferSnapshotRecord>> {
        let params = FilterParams::from(filter);
        let sql = format!(
            "{SELECT_COLUMNS} WHERE {FILTER_CLAUSE} AND timestamp >= $4 AND timestamp < $5 \
             ORDER BY offer_id, machine_id, timestamp"
        );

        sqlx::query_as::<_, OfferSnapshotRecord>(&sql)
            .bind(params.name_patterns)
            .bind(params.gpu_counts)
            .bind(params.verification)
            .bind(window.since())
            .bind(window.until())
            .fetch_all(&self.pool)
            .await
            .context("Failed to query snapshots by range")
    }

    /// Queries the distinct poll timestamps inside a window, ascending.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn query_distinct_timestamps(&self, window: &TimeWindow) -> Result<Vec<DateTime<Utc>>> {
        let rows: Vec<(DateTime<Utc>,)> = sqlx::query_as(
            r"
            SELECT DISTINCT timestamp
            FROM offer_snapshots
            WHERE timestamp >= $1 AND timestamp < $2
            ORDER BY timestamp ASC
            ",
        )
        .bind(window.since())
        .bind(window.until())
        .fetch_all(&self.pool)
        .await
        .context("Failed to query distinct timestamps")?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Point lookup of the snapshots taken at exactly `first` or `second`.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn query_at(
        &self,
        first: DateTime<Utc>,
        second: DateTime<Utc>,
        filter: &SnapshotFilter,
    ) -> Result<Vec<OfferSnapshotRecord>> {
        let params = FilterParams::from(filter);
        let sql = format!(
            "{SELECT_COLUMNS} WHERE {FILTER_CLAUSE} AND timestamp IN ($4, $5) \
             ORDER BY offer_id, machine_id, timestamp"
        );

        sqlx::query_as::<_, OfferSnapshotRecord>(&sql)
            .bind(params.name_patterns)
            .bind(params.gpu_counts)
            .bind(params.verification)
            .bind(first)
            .bind(second)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query snapshots at timestamps")
    }

    /// Queries the snapshots of the most recent poll cycle.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn query_latest(&self, filter: &SnapshotFilter) -> Result<Vec<OfferSnapshotRecord>> {
        let params = FilterParams::from(filter);
        let sql = format!(
            "{SELECT_COLUMNS} WHERE {FILTER_CLAUSE} \
             AND timestamp = (SELECT MAX(timestamp) FROM offer_snapshots) \
             ORDER BY offer_id, machine_id"
        );

        sqlx::query_as::<_, OfferSnapshotRecord>(&sql)
            .bind(params.name_patterns)
            .bind(params.gpu_counts)
            .bind(params.verification)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query latest snapshot")
    }

    /// Queries every stored row, ordered by `(timestamp, offer_id)`.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn query_all(&self) -> Result<Vec<OfferSnapshotRecord>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY timestamp, offer_id");
        sqlx::query_as::<_, OfferSnapshotRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query all snapshots")
    }

    /// Gets the data bounds (earliest and latest timestamps).
    ///
    /// # Returns
    /// A tuple of (earliest_timestamp, latest_timestamp), or None if no data exists.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    #[allow(clippy::type_complexity)]
    pub async fn get_data_bounds(&self) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let row: Option<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> = sqlx::query_as(
            r"
            SELECT MIN(timestamp), MAX(timestamp)
            FROM offer_snapshots
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query data bounds")?;

        match row {
            Some((Some(min), Some(max))) => Ok(Some((min, max))),
            _ => Ok(None),
        }
    }

    /// Row count, bounds, and distinct cycles, GPU models, and offers.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn status(&self) -> Result<DataStatus> {
        let row: (i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>, i64, i64, i64) = sqlx::query_as(
            r"
            SELECT COUNT(*),
                   MIN(timestamp),
                   MAX(timestamp),
                   COUNT(DISTINCT timestamp),
                   COUNT(DISTINCT gpu_name),
                   COUNT(DISTINCT offer_id)
            FROM offer_snapshots
            ",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to query data status")?;

        Ok(DataStatus {
            rows: row.0,
            earliest: row.1,
            latest: row.2,
            poll_cycles: row.3,
            gpu_models: row.4,
            offers: row.5,
        })
    }
}

fn to_snapshots(records: Vec<OfferSnapshotRecord>) -> Vec<SnapshotRecord> {
    records.into_iter().map(SnapshotRecord::from).collect()
}

#[async_trait]
impl SnapshotStore for OfferSnapshotRepository {
    async fn snapshots_in_range(
        &self,
        window: &TimeWindow,
        filter: &SnapshotFilter,
    ) -> vastwatch_core::Result<Vec<SnapshotRecord>> {
        self.query_range(window, filter)
            .await
            .map(to_snapshots)
            .map_err(OccupancyError::store)
    }

    async fn distinct_timestamps(
        &self,
        window: &TimeWindow,
    ) -> vastwatch_core::Result<Vec<DateTime<Utc>>> {
        self.query_distinct_timestamps(window)
            .await
            .map_err(OccupancyError::store)
    }

    async fn snapshots_at(
        &self,
        first: DateTime<Utc>,
        second: DateTime<Utc>,
        filter: &SnapshotFilter,
    ) -> vastwatch_core::Result<Vec<SnapshotRecord>> {
        self.query_at(first, second, filter)
            .await
            .map(to_snapshots)
            .map_err(OccupancyError::store)
    }

    async fn latest_snapshot(
        &self,
        filter: &SnapshotFilter,
    ) -> vastwatch_core::Result<Vec<SnapshotRecord>> {
        self.query_latest(filter)
            .await
            .map(to_snapshots)
            .map_err(OccupancyError::store)
    }

    async fn bounds(&self) -> vastwatch_core::Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        self.get_data_bounds().await.map_err(OccupancyError::store)
    }
}
