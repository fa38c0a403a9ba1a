//! Clearing prices: what offers were listed at just before being rented.

use futures_util::TryStreamExt;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use vastwatch_core::{Result, SnapshotFilter, SnapshotStore, TimeWindow};

use crate::report::dimension::GroupDimension;
use crate::stats::PriceSummary;
use crate::transition::{Transition, TransitionDetector, TransitionPattern};

/// Transitions and their price distribution for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClearingPriceRow {
    pub group: String,
    pub transitions: usize,
    /// `None` when no transition carried a price
    pub prices: Option<PriceSummary>,
}

#[derive(Default)]
struct GroupPrices {
    transitions: usize,
    prices: Vec<Decimal>,
}

/// Folds transitions into per-group price rows, most active group first.
#[must_use]
pub fn summarize_transitions<'a, I>(transitions: I, dimension: GroupDimension) -> Vec<ClearingPriceRow>
where
    I: IntoIterator<Item = &'a Transition>,
{
    let mut groups: BTreeMap<String, GroupPrices> = BTreeMap::new();
    for transition in transitions {
        add(&mut groups, transition, dimension);
    }
    into_rows(groups)
}

fn add(groups: &mut BTreeMap<String, GroupPrices>, transition: &Transition, dimension: GroupDimension) {
    let entry = groups
        .entry(dimension.label(&transition.attributes))
        .or_default();
    entry.transitions += 1;
    if let Some(price) = transition.price_before {
        entry.prices.push(price);
    }
}

fn into_rows(groups: BTreeMap<String, GroupPrices>) -> Vec<ClearingPriceRow> {
    let mut rows: Vec<ClearingPriceRow> = groups
        .into_iter()
        .map(|(group, g)| ClearingPriceRow {
            group,
            transitions: g.transitions,
            prices: PriceSummary::from_prices(&g.prices),
        })
        .collect();
    rows.sort_by(|a, b| {
        b.transitions
            .cmp(&a.transitions)
            .then_with(|| a.group.cmp(&b.group))
    });
    rows
}

/// Streams `pattern` transitions from the store and summarizes `price_before`
/// per group, without materializing the transition list.
///
/// # Errors
/// Returns the first store error.
pub async fn clearing_prices<S>(
    store: &S,
    window: TimeWindow,
    pattern: TransitionPattern,
    filter: SnapshotFilter,
    dimension: GroupDimension,
) -> Result<Vec<ClearingPriceRow>>
where
    S: SnapshotStore + ?Sized,
{
    let detector = TransitionDetector::new(store);
    let groups = detector
        .stream(window, pattern, filter)
        .try_fold(BTreeMap::new(), |mut groups, transition| async move {
            add(&mut groups, &transition, dimension);
            Ok(groups)
        })
        .await?;

    tracing::debug!(
        groups = groups.len(),
        since = %window.since(),
        "Summarized clearing prices"
    );
    Ok(into_rows(groups))
}
