//! Price distribution summaries.

use rust_decimal::Decimal;
use serde::Serialize;

/// Distribution of a set of prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceSummary {
    pub count: usize,
    pub mean: Decimal,
    pub median: Decimal,
    pub p10: Decimal,
    pub p90: Decimal,
    pub min: Decimal,
    pub max: Decimal,
}

impl PriceSummary {
    /// Summarizes `prices`, or returns `None` when there are none.
    #[must_use]
    pub fn from_prices(prices: &[Decimal]) -> Option<Self> {
        if prices.is_empty() {
            return None;
        }

        let mut sorted = prices.to_vec();
        sorted.sort_unstable();
        let n = sorted.len();

        let sum: Decimal = sorted.iter().sum();
        let mean = sum / Decimal::from(n);

        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / Decimal::TWO
        };

        Some(Self {
            count: n,
            mean,
            median,
            p10: percentile(&sorted, 0.10),
            p90: percentile(&sorted, 0.90),
            min: sorted[0],
            max: sorted[n - 1],
        })
    }
}

/// Percentile of an ascending slice: the element at `round(p × (n - 1))`.
///
/// `p` is clamped to `[0, 1]`. An empty slice yields zero.
#[must_use]
pub fn percentile(sorted: &[Decimal], p: f64) -> Decimal {
    let Some(last) = sorted.len().checked_sub(1) else {
        return Decimal::ZERO;
    };
    let idx = (p.clamp(0.0, 1.0) * last as f64).round() as usize;
    sorted[idx.min(last)]
}
