//! Balance aggregation
//!
//! Fans out to every wallet and channel source of the requested symbols and
//! joins the results into a single `BalanceData`.

mod aggregator;

pub use aggregator::BalanceAggregator;
