//! Snapshot collector.
//!
//! Each poll cycle stamps one UTC timestamp (second precision), runs the
//! available, rented and unavailable queries, normalizes every offer and sends
//! the whole cycle as one batch over a channel. A failed cycle backs off
//! linearly; a successful one resets the backoff.

use crate::client::{backoff_delay, OfferQuery, OfferSource};
use crate::error::Result;
use crate::models::normalize_offer;
use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use vastwatch_core::{CollectorConfig, MIN_POLL_INTERVAL_SECS};
use vastwatch_data::OfferSnapshotRecord;

/// Queries issued per cycle, in insertion order.
pub const CYCLE_QUERIES: [OfferQuery; 3] = [
    OfferQuery::AVAILABLE,
    OfferQuery::RENTED,
    OfferQuery::UNAVAILABLE,
];

/// Configuration for the snapshot collector.
#[derive(Debug, Clone)]
pub struct SnapshotCollectorConfig {
    /// Sleep between successful cycles
    pub poll_interval: Duration,
    /// Backoff unit after failed cycles
    pub backoff_base: Duration,
    /// Stop after this many attempted cycles (None = run forever)
    pub max_cycles: Option<u64>,
}

impl Default for SnapshotCollectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(MIN_POLL_INTERVAL_SECS),
            backoff_base: Duration::from_secs(MIN_POLL_INTERVAL_SECS),
            max_cycles: None,
        }
    }
}

impl SnapshotCollectorConfig {
    /// Builds from the `[collector]` section, applying the poll interval floor.
    #[must_use]
    pub fn from_config(config: &CollectorConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.effective_poll_interval_secs()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    #[must_use]
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }
}

/// Offers fetched per query in one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleCounts {
    pub available: usize,
    pub rented: usize,
    pub unavailable: usize,
}

impl CycleCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.available + self.rented + self.unavailable
    }
}

/// Statistics for the snapshot collector.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectorStats {
    /// Successful poll cycles
    pub poll_cycles: u64,
    /// Rows sent downstream
    pub records_emitted: u64,
    /// Failed cycles
    pub errors: u64,
    /// Current backoff attempt; zero after a success
    pub backoff_attempt: u32,
    /// Timestamp of the last successful cycle
    pub last_poll: Option<DateTime<Utc>>,
    pub last_counts: CycleCounts,
}

impl CollectorStats {
    /// Records a successful poll cycle.
    pub fn record_poll(&mut self, timestamp: DateTime<Utc>, counts: CycleCounts) {
        self.poll_cycles += 1;
        self.records_emitted += counts.total() as u64;
        self.backoff_attempt = 0;
        self.last_poll = Some(timestamp);
        self.last_counts = counts;
    }

    /// Records a failed cycle and returns the new backoff attempt.
    pub fn record_error(&mut self) -> u32 {
        self.errors += 1;
        self.backoff_attempt = self.backoff_attempt.saturating_add(1);
        self.backoff_attempt
    }
}

/// Event types emitted by the collector.
#[derive(Debug, Clone)]
pub enum CollectorEvent {
    /// Collector started
    Started,
    /// Cycle fetched and sent
    CycleCompleted {
        timestamp: DateTime<Utc>,
        counts: CycleCounts,
    },
    /// Cycle failed; sleeping before the next one
    BackingOff {
        attempt: u32,
        delay: Duration,
        message: String,
    },
    /// Collector stopped
    Stopped,
}

/// Current time truncated to whole seconds.
#[must_use]
pub fn cycle_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Polls the marketplace and emits one batch of snapshot rows per cycle.
pub struct SnapshotCollector<S> {
    source: S,
    config: SnapshotCollectorConfig,
    tx: mpsc::Sender<Vec<OfferSnapshotRecord>>,
    event_tx: Option<mpsc::Sender<CollectorEvent>>,
    stats: CollectorStats,
}

impl<S: OfferSource> SnapshotCollector<S> {
    /// Creates a new collector.
    pub fn new(
        source: S,
        config: SnapshotCollectorConfig,
        tx: mpsc::Sender<Vec<OfferSnapshotRecord>>,
    ) -> Self {
        Self {
            source,
            config,
            tx,
            event_tx: None,
            stats: CollectorStats::default(),
        }
    }

    /// Sets an event channel for monitoring.
    #[must_use]
    pub fn with_event_channel(mut self, tx: mpsc::Sender<CollectorEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Returns a reference to current statistics.
    pub fn stats(&self) -> &CollectorStats {
        &self.stats
    }

    /// Fetches one cycle and sends it as a single batch.
    ///
    /// Nothing is sent unless all three queries succeed.
    ///
    /// # Errors
    /// Returns the first query error.
    pub async fn poll_once(&mut self) -> Result<CycleCounts> {
        let timestamp = cycle_timestamp();
        tracing::info!(%timestamp, "Polling Vast offers (available + rented + unavailable)");

        let mut batch = Vec::new();
        let mut sizes = [0usize; 3];
        for (size, query) in sizes.iter_mut().zip(CYCLE_QUERIES) {
            let offers = self.source.search_offers(query).await?;
            *size = offers.len();
            let state = Some(query.source_state());
            batch.extend(
                offers
                    .iter()
                    .map(|offer| normalize_offer(offer, timestamp, state)),
            );
        }

        let counts = CycleCounts {
            available: sizes[0],
            rented: sizes[1],
            unavailable: sizes[2],
        };
        tracing::info!(
            available = counts.available,
            rented = counts.rented,
            unavailable = counts.unavailable,
            "Fetched offers"
        );

        if self.tx.send(batch).await.is_err() {
            tracing::warn!("Snapshot batch channel closed");
        }

        self.stats.record_poll(timestamp, counts);
        self.emit_event(CollectorEvent::CycleCompleted { timestamp, counts })
            .await;
        Ok(counts)
    }

    /// Runs the collector until the output channel closes or `max_cycles`
    /// cycles have been attempted.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.emit_event(CollectorEvent::Started).await;
        tracing::info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Collector started"
        );

        let mut attempted: u64 = 0;
        loop {
            let delay = match self.poll_once().await {
                Ok(_) => self.config.poll_interval,
                Err(e) => {
                    let attempt = self.stats.record_error();
                    let delay = backoff_delay(self.config.backoff_base, attempt);
                    tracing::warn!(
                        error = %e,
                        status = ?e.status(),
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        "Vast API error, backing off"
                    );
                    self.emit_event(CollectorEvent::BackingOff {
                        attempt,
                        delay,
                        message: e.to_string(),
                    })
                    .await;
                    delay
                }
            };

            attempted += 1;
            if self.tx.is_closed() {
                tracing::info!("Output channel closed, stopping collector");
                break;
            }
            if self.config.max_cycles.is_some_and(|max| attempted >= max) {
                break;
            }

            tokio::time::sleep(delay).await;
        }

        tracing::info!(
            stats = %serde_json::to_string(&self.stats).unwrap_or_default(),
            "Collector stopped"
        );
        self.emit_event(CollectorEvent::Stopped).await;
        Ok(())
    }

    /// Emits an event if the event channel is configured.
    async fn emit_event(&self, event: CollectorEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VastError;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves canned offers per query; fails the first `failures` calls.
    struct FakeSource {
        calls: Arc<AtomicUsize>,
        failures: usize,
    }

    #[async_trait]
    impl OfferSource for FakeSource {
        async fn search_offers(&self, query: OfferQuery) -> Result<Vec<Value>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(VastError::unavailable(503));
            }
            Ok(match query.source_state() {
                vastwatch_core::OfferState::Available => vec![
                    json!({"id": 1, "machine_id": 10, "gpu_name": "RTX 4090", "dph_total": 0.4}),
                    json!({"id": 2, "machine_id": 11, "gpu_name": "RTX 4090", "dph_total": 0.5}),
                ],
                vastwatch_core::OfferState::Rented => {
                    vec![json!({"id": 3, "machine_id": 12, "gpu_name": "A100"})]
                }
                _ => vec![],
            })
        }
    }

    fn fast_config() -> SnapshotCollectorConfig {
        SnapshotCollectorConfig::default()
            .with_poll_interval(Duration::ZERO)
            .with_backoff_base(Duration::ZERO)
    }

    #[test]
    fn test_config_from_collector_section_applies_floor() {
        let config = SnapshotCollectorConfig::from_config(&CollectorConfig {
            poll_interval_secs: 30,
            ..CollectorConfig::default()
        });
        assert_eq!(config.poll_interval, Duration::from_secs(360));
    }

    #[test]
    fn test_stats_reset_backoff_on_success() {
        let mut stats = CollectorStats::default();
        assert_eq!(stats.record_error(), 1);
        assert_eq!(stats.record_error(), 2);
        stats.record_poll(Utc::now(), CycleCounts { available: 2, rented: 1, unavailable: 0 });
        assert_eq!(stats.backoff_attempt, 0);
        assert_eq!(stats.records_emitted, 3);
        assert_eq!(stats.errors, 2);
    }

    #[test]
    fn test_stats_serialize_for_reporting() {
        let mut stats = CollectorStats::default();
        let ts = Utc::now().trunc_subsecs(0);
        stats.record_poll(ts, CycleCounts { available: 4, rented: 2, unavailable: 1 });

        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["poll_cycles"], json!(1));
        assert_eq!(value["records_emitted"], json!(7));
        assert_eq!(value["last_counts"], json!({"available": 4, "rented": 2, "unavailable": 1}));
        assert!(value["last_poll"].is_string());
    }

    #[tokio::test]
    async fn test_poll_once_sends_one_batch() {
        let (tx, mut rx) = mpsc::channel(4);
        let source = FakeSource {
            calls: Arc::new(AtomicUsize::new(0)),
            failures: 0,
        };
        let mut collector = SnapshotCollector::new(source, fast_config(), tx);

        let counts = collector.poll_once().await.unwrap();
        assert_eq!(counts, CycleCounts { available: 2, rented: 1, unavailable: 0 });

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batch.iter().all(|r| r.timestamp == batch[0].timestamp));
        assert_eq!(batch[0].timestamp.timestamp_subsec_nanos(), 0);
        assert_eq!(batch[0].state, "available");
        assert_eq!(batch[2].state, "rented");
        assert_eq!(collector.stats().poll_cycles, 1);
    }

    #[tokio::test]
    async fn test_run_backs_off_then_recovers() {
        let (tx, mut rx) = mpsc::channel(4);
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let calls = Arc::new(AtomicUsize::new(0));
        let source = FakeSource {
            calls: Arc::clone(&calls),
            failures: 1,
        };
        let mut collector = SnapshotCollector::new(source, fast_config().with_max_cycles(2), tx)
            .with_event_channel(event_tx);

        collector.run().await.unwrap();

        // First cycle fails on its first query; second cycle runs all three.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(collector.stats().errors, 1);
        assert_eq!(collector.stats().poll_cycles, 1);
        assert_eq!(collector.stats().backoff_attempt, 0);
        assert_eq!(rx.recv().await.unwrap().len(), 3);

        let mut saw_backoff = false;
        while let Ok(event) = event_rx.try_recv() {
            if let CollectorEvent::BackingOff { attempt, .. } = event {
                assert_eq!(attempt, 1);
                saw_backoff = true;
            }
        }
        assert!(saw_backoff);
    }

    #[tokio::test]
    async fn test_run_stops_when_channel_closes() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let source = FakeSource {
            calls: Arc::new(AtomicUsize::new(0)),
            failures: 0,
        };
        let mut collector = SnapshotCollector::new(source, fast_config(), tx);
        collector.run().await.unwrap();
        assert_eq!(collector.stats().poll_cycles, 1);
    }
}
