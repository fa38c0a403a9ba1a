use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use vastwatch_core::DatabaseConfig;

/// Table, key, and indexes for offer snapshots.
///
/// The `(timestamp, offer_id)` key collapses duplicate rows inside one poll
/// cycle. The timestamp index serves point lookups and latest-cycle queries;
/// the `(gpu_name, offer_id, timestamp)` index serves filtered range scans.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS offer_snapshots (
    timestamp        TIMESTAMPTZ      NOT NULL,
    offer_id         BIGINT           NOT NULL,
    machine_id       BIGINT           NOT NULL,
    gpu_name         TEXT,
    num_gpus         INTEGER          NOT NULL DEFAULT 1,
    gpu_frac         DOUBLE PRECISION,
    gpu_total_ram_gb DOUBLE PRECISION,
    price_per_hour   NUMERIC(18, 6),
    reliability      DOUBLE PRECISION,
    geolocation      TEXT,
    offer_type       TEXT,
    rentable         BOOLEAN,
    rented           BOOLEAN,
    verified         BOOLEAN          NOT NULL DEFAULT FALSE,
    deverified       BOOLEAN          NOT NULL DEFAULT FALSE,
    state            TEXT             NOT NULL DEFAULT 'unknown',
    PRIMARY KEY (timestamp, offer_id)
);

CREATE INDEX IF NOT EXISTS idx_offer_snapshots_timestamp
    ON offer_snapshots (timestamp);

CREATE INDEX IF NOT EXISTS idx_offer_snapshots_gpu_offer_ts
    ON offer_snapshots (gpu_name, offer_id, timestamp);
";

pub struct DatabaseClient {
    pool: PgPool,
}

impl DatabaseClient {
    /// Creates a new database client connected to the specified `PostgreSQL` database.
    ///
    /// # Errors
    /// Returns an error if the database connection cannot be established.
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::connect(database_url, 10).await
    }

    /// Connects with an explicit pool size.
    ///
    /// # Errors
    /// Returns an error if the database connection cannot be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self { pool })
    }

    /// Connects using the `[database]` configuration section.
    ///
    /// # Errors
    /// Returns an error if the database connection cannot be established.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::connect(&config.url, config.max_connections).await
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the snapshot table and its indexes if missing.
    ///
    /// # Errors
    /// Returns an error if any DDL statement fails.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("Failed to create offer_snapshots schema")?;
        tracing::debug!("offer_snapshots schema ensured");
        Ok(())
    }
}
