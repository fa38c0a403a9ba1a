//! Market summary of the latest poll cycle.
//!
//! Offers are grouped by GPU model and GPU count bucket. Utilization is
//! `rented / (available + rented)`, so hosts that withdrew their machines do
//! not inflate it. Each row also carries the group's rented-time share over
//! the whole recorded history.

use chrono::Duration;
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use vastwatch_core::{
    OfferState, Result, SnapshotFilter, SnapshotRecord, SnapshotStore, TimeWindow, Verification,
};

use crate::aggregate::GroupOccupancy;
use crate::interval::{entity_runs, IntervalReconstructor};
use crate::report::dimension::{gpu_count_bucket, GroupDimension};
use crate::report::occupancy::default_window;

/// (GPU model, GPU count bucket)
pub type SummaryKey = (String, String);

fn summary_key(record: &SnapshotRecord) -> SummaryKey {
    (
        GroupDimension::Gpu.label(&record.attributes),
        gpu_count_bucket(record.attributes.num_gpus),
    )
}

/// One (GPU model, GPU count bucket) row of the latest market snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSummaryRow {
    /// Dense rank by rented count, utilization, then available count
    pub rank: usize,
    pub gpu_name: String,
    pub gpus: String,
    pub offers: usize,
    pub available: usize,
    pub rented: usize,
    pub unavailable: usize,
    pub unknown: usize,
    /// `100 × rented / (available + rented)`
    pub utilization_pct: Option<Decimal>,
    pub avg_price_available: Option<Decimal>,
    pub avg_price_rented: Option<Decimal>,
    /// Average rented price weighted by utilization, per GPU
    pub expected_per_gpu: Option<Decimal>,
    pub verified: usize,
    pub deverified: usize,
    pub avg_gpu_count: Decimal,
    /// Snapshots of this group across the whole history
    pub occupancy_samples: usize,
    /// `100 × rented time / observed time` across the whole history
    pub rented_time_pct: Option<Decimal>,
}

/// History-wide occupancy of one summary group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupHistory {
    pub samples: usize,
    pub occupancy: GroupOccupancy,
}

impl GroupHistory {
    /// Rented share of all observed time, in percent.
    #[must_use]
    pub fn rented_time_pct(&self) -> Option<Decimal> {
        let durations = self.occupancy.durations();
        let observed = durations.observed().num_milliseconds();
        if observed <= 0 {
            return None;
        }
        let rented = durations.get(OfferState::Rented).num_milliseconds();
        Some(Decimal::from(rented) * Decimal::ONE_HUNDRED / Decimal::from(observed))
    }
}

/// Aggregates per-entity snapshot runs into history per summary group.
///
/// An entity is grouped by its last snapshot in the run.
pub fn summarize_history<'a, I>(
    runs: I,
    window: &TimeWindow,
    reconstructor: &IntervalReconstructor,
) -> BTreeMap<SummaryKey, GroupHistory>
where
    I: IntoIterator<Item = &'a [SnapshotRecord]>,
{
    let mut groups: BTreeMap<SummaryKey, GroupHistory> = BTreeMap::new();
    for run in runs {
        let Some(last) = run.last() else {
            continue;
        };
        let group = groups.entry(summary_key(last)).or_default();
        group.samples += run.len();
        for interval in reconstructor.reconstruct(run, window) {
            group.occupancy.add(&interval);
        }
    }
    groups
}

#[derive(Default)]
struct Accumulator {
    offers: usize,
    counts: BTreeMap<OfferState, usize>,
    available_prices: Vec<Decimal>,
    rented_prices: Vec<Decimal>,
    verified: usize,
    deverified: usize,
    gpu_total: i64,
}

impl Accumulator {
    fn add(&mut self, record: &SnapshotRecord) {
        self.offers += 1;
        *self.counts.entry(record.state).or_default() += 1;
        match (record.state, record.price) {
            (OfferState::Available, Some(price)) => self.available_prices.push(price),
            (OfferState::Rented, Some(price)) => self.rented_prices.push(price),
            _ => {}
        }
        match record.attributes.verification {
            Verification::Verified => self.verified += 1,
            Verification::Deverified => self.deverified += 1,
            Verification::Unverified => {}
        }
        self.gpu_total += i64::from(record.attributes.num_gpus);
    }

    fn count(&self, state: OfferState) -> usize {
        self.counts.get(&state).copied().unwrap_or(0)
    }

    fn into_row(self, gpu_name: String, gpus: String) -> MarketSummaryRow {
        let available = self.count(OfferState::Available);
        let rented = self.count(OfferState::Rented);

        let utilization = ratio(rented, available + rented);
        let avg_price_rented = average(&self.rented_prices);
        let avg_gpu_count = if self.offers == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.gpu_total) / Decimal::from(self.offers)
        };
        let expected_per_gpu = match (avg_price_rented, utilization) {
            (Some(price), Some(util)) if avg_gpu_count > Decimal::ZERO => {
                Some(price * util / avg_gpu_count)
            }
            _ => None,
        };

        MarketSummaryRow {
            rank: 0,
            gpu_name,
            gpus,
            offers: self.offers,
            available,
            rented,
            unavailable: self.count(OfferState::Unavailable),
            unknown: self.count(OfferState::Unknown),
            utilization_pct: utilization.map(|u| u * Decimal::ONE_HUNDRED),
            avg_price_available: average(&self.available_prices),
            avg_price_rented,
            expected_per_gpu,
            verified: self.verified,
            deverified: self.deverified,
            avg_gpu_count,
            occupancy_samples: 0,
            rented_time_pct: None,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> Option<Decimal> {
    if denominator == 0 {
        return None;
    }
    Some(Decimal::from(numerator) / Decimal::from(denominator))
}

fn average(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum: Decimal = values.iter().sum();
    Some(sum / Decimal::from(values.len()))
}

/// Summarizes one poll cycle's records without history columns.
#[must_use]
pub fn summarize_market(records: &[SnapshotRecord]) -> Vec<MarketSummaryRow> {
    summarize_market_with_history(records, &BTreeMap::new())
}

/// Summarizes one poll cycle's records, joining history per group.
///
/// Rows come back in rank order, ties broken by GPU name then bucket.
/// Groups absent from `history` get zero samples and no rented-time share.
#[must_use]
pub fn summarize_market_with_history(
    records: &[SnapshotRecord],
    history: &BTreeMap<SummaryKey, GroupHistory>,
) -> Vec<MarketSummaryRow> {
    let mut groups: BTreeMap<SummaryKey, Accumulator> = BTreeMap::new();
    for record in records {
        groups.entry(summary_key(record)).or_default().add(record);
    }

    let mut rows: Vec<MarketSummaryRow> = groups
        .into_iter()
        .map(|(key, acc)| {
            let past = history.get(&key);
            let (gpu_name, gpus) = key;
            let mut row = acc.into_row(gpu_name, gpus);
            if let Some(past) = past {
                row.occupancy_samples = past.samples;
                row.rented_time_pct = past.rented_time_pct();
            }
            row
        })
        .collect();

    rows.sort_by(|a, b| {
        rank_order(a, b)
            .then_with(|| a.gpu_name.cmp(&b.gpu_name))
            .then_with(|| a.gpus.cmp(&b.gpus))
    });

    let mut rank = 0;
    let mut previous: Option<usize> = None;
    for idx in 0..rows.len() {
        let tied = previous.is_some_and(|p| rank_order(&rows[p], &rows[idx]) == Ordering::Equal);
        if !tied {
            rank += 1;
        }
        rows[idx].rank = rank;
        previous = Some(idx);
    }
    rows
}

/// Rented desc, utilization desc, available desc.
fn rank_order(a: &MarketSummaryRow, b: &MarketSummaryRow) -> Ordering {
    b.rented
        .cmp(&a.rented)
        .then_with(|| b.utilization_pct.cmp(&a.utilization_pct))
        .then_with(|| b.available.cmp(&a.available))
}

/// Latest cycle plus every snapshot over the store's full extent.
struct MarketHistory {
    latest: Vec<SnapshotRecord>,
    history: Vec<SnapshotRecord>,
    window: Option<TimeWindow>,
    reconstructor: IntervalReconstructor,
}

impl MarketHistory {
    async fn load<S>(store: &S, filter: &SnapshotFilter, poll_interval: Duration) -> Result<Self>
    where
        S: SnapshotStore + ?Sized,
    {
        let reconstructor = IntervalReconstructor::new(poll_interval)?;
        let latest = store.latest_snapshot(filter).await?;
        let window = default_window(store, None, None, poll_interval).await?;
        let history = match &window {
            Some(window) => store.snapshots_in_range(window, filter).await?,
            None => Vec::new(),
        };
        Ok(Self {
            latest,
            history,
            window,
            reconstructor,
        })
    }

    fn summarize<F>(&self, keep: F) -> Vec<MarketSummaryRow>
    where
        F: Fn(&SnapshotRecord) -> bool,
    {
        let latest: Vec<SnapshotRecord> = self.latest.iter().filter(|r| keep(r)).cloned().collect();
        let history = match &self.window {
            Some(window) => summarize_history(
                entity_runs(&self.history).filter(|run| run.last().is_some_and(&keep)),
                window,
                &self.reconstructor,
            ),
            None => BTreeMap::new(),
        };
        summarize_market_with_history(&latest, &history)
    }
}

/// Market summary of the latest poll cycle matching `filter`.
///
/// History columns cover every snapshot matching `filter`, with the last
/// state of each offer extrapolated by `poll_interval`.
///
/// # Errors
/// Returns `InvalidPollInterval` for a non-positive interval, or the store's error.
pub async fn latest_market_summary<S>(
    store: &S,
    filter: &SnapshotFilter,
    poll_interval: Duration,
) -> Result<Vec<MarketSummaryRow>>
where
    S: SnapshotStore + ?Sized,
{
    let market = MarketHistory::load(store, filter, poll_interval).await?;
    Ok(market.summarize(|_| true))
}

/// Latest market summary split into verified and non-verified hosts.
///
/// # Errors
/// Returns `InvalidPollInterval` for a non-positive interval, or the store's error.
pub async fn latest_market_summary_split<S>(
    store: &S,
    filter: &SnapshotFilter,
    poll_interval: Duration,
) -> Result<(Vec<MarketSummaryRow>, Vec<MarketSummaryRow>)>
where
    S: SnapshotStore + ?Sized,
{
    let market = MarketHistory::load(store, filter, poll_interval).await?;
    let is_verified = |r: &SnapshotRecord| r.attributes.verification == Verification::Verified;
    Ok((market.summarize(is_verified), market.summarize(|r| !is_verified(r))))
}

/// Sortable column of the market summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryColumn {
    Rank,
    GpuName,
    Gpus,
    Offers,
    Available,
    Rented,
    Unavailable,
    Unknown,
    UtilizationPct,
    AvgPriceAvailable,
    AvgPriceRented,
    ExpectedPerGpu,
    Verified,
    Deverified,
    AvgGpuCount,
    OccupancySamples,
    RentedTimePct,
}

impl SummaryColumn {
    pub const ALL: [SummaryColumn; 17] = [
        Self::Rank,
        Self::GpuName,
        Self::Gpus,
        Self::Offers,
        Self::Available,
        Self::Rented,
        Self::Unavailable,
        Self::Unknown,
        Self::UtilizationPct,
        Self::AvgPriceAvailable,
        Self::AvgPriceRented,
        Self::ExpectedPerGpu,
        Self::Verified,
        Self::Deverified,
        Self::AvgGpuCount,
        Self::OccupancySamples,
        Self::RentedTimePct,
    ];

    /// Column header, also accepted by `FromStr`.
    #[must_use]
    pub fn header(&self) -> &'static str {
        match self {
            Self::Rank => "rank",
            Self::GpuName => "gpu_name",
            Self::Gpus => "gpus",
            Self::Offers => "offers",
            Self::Available => "available",
            Self::Rented => "rented",
            Self::Unavailable => "unavailable",
            Self::Unknown => "unknown",
            Self::UtilizationPct => "util_pct",
            Self::AvgPriceAvailable => "price_avail",
            Self::AvgPriceRented => "price_rented",
            Self::ExpectedPerGpu => "exp_per_gpu",
            Self::Verified => "verified",
            Self::Deverified => "deverified",
            Self::AvgGpuCount => "avg_gpus",
            Self::OccupancySamples => "occ_samples",
            Self::RentedTimePct => "rented_time_pct",
        }
    }

    fn value(&self, row: &MarketSummaryRow) -> SortValue {
        let count = |n: usize| SortValue::Number(Decimal::from(n));
        let opt = |v: Option<Decimal>| v.map_or(SortValue::Missing, SortValue::Number);
        match self {
            Self::Rank => count(row.rank),
            Self::GpuName => SortValue::Text(row.gpu_name.clone()),
            Self::Gpus => SortValue::Text(row.gpus.clone()),
            Self::Offers => count(row.offers),
            Self::Available => count(row.available),
            Self::Rented => count(row.rented),
            Self::Unavailable => count(row.unavailable),
            Self::Unknown => count(row.unknown),
            Self::UtilizationPct => opt(row.utilization_pct),
            Self::AvgPriceAvailable => opt(row.avg_price_available),
            Self::AvgPriceRented => opt(row.avg_price_rented),
            Self::ExpectedPerGpu => opt(row.expected_per_gpu),
            Self::Verified => count(row.verified),
            Self::Deverified => count(row.deverified),
            Self::AvgGpuCount => SortValue::Number(row.avg_gpu_count),
            Self::OccupancySamples => count(row.occupancy_samples),
            Self::RentedTimePct => opt(row.rented_time_pct),
        }
    }
}

impl FromStr for SummaryColumn {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.header() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(SummaryColumn::header).collect();
                format!("unknown column '{wanted}', expected one of: {}", names.join(", "))
            })
    }
}

/// Missing values sort below every number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue {
    Missing,
    Number(Decimal),
    Text(String),
}

/// A `+column` (ascending) or `-column` (descending) sort.
///
/// A bare column name sorts descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub column: SummaryColumn,
    pub descending: bool,
}

impl SortSpec {
    /// Stable-sorts rows by this column.
    pub fn apply(&self, rows: &mut [MarketSummaryRow]) {
        rows.sort_by(|a, b| {
            let ord = self.column.value(a).cmp(&self.column.value(b));
            if self.descending {
                ord.reverse()
            } else {
                ord
            }
        });
    }
}

impl FromStr for SortSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let (descending, name) = match s.strip_prefix('+') {
            Some(rest) => (false, rest),
            None => (true, s.strip_prefix('-').unwrap_or(s)),
        };
        Ok(Self {
            column: name.parse()?,
            descending,
        })
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.descending { '-' } else { '+' };
        write!(f, "{sign}{}", self.column.header())
    }
}
