//! Report builders on top of the occupancy engine.

pub mod clearing;
pub mod dimension;
pub mod latest;
pub mod occupancy;

pub use clearing::{clearing_prices, summarize_transitions, ClearingPriceRow};
pub use dimension::{gpu_count_bucket, GroupDimension, UNKNOWN_LABEL};
pub use latest::{
    latest_market_summary, latest_market_summary_split, summarize_history, summarize_market,
    summarize_market_with_history, GroupHistory, MarketSummaryRow, SortSpec, SummaryColumn,
    SummaryKey,
};
pub use occupancy::{
    default_window, occupancy_by, occupancy_by_group, occupancy_by_offer, GroupOccupancyRow,
    OccupancyQuery, OfferOccupancyRow,
};
