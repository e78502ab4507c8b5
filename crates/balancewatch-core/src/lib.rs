//! # BalanceWatch
//!
//! Treasury balance monitoring for a multi-currency swap service.
//!
//! BalanceWatch gathers wallet and payment channel balances from every
//! configured backend, raises and clears alerts when balances cross their
//! thresholds, and records point-in-time balance snapshots for audit.
//!
//! ## Architecture
//!
//! - **Sources**: wallet and channel backends behind async traits
//! - **Aggregator**: concurrent, failure-tolerant balance gathering
//! - **Alerting**: edge-triggered threshold evaluation and webhook delivery
//! - **Storage**: PostgreSQL snapshot store, with an in-memory alternative
//! - **Monitor**: periodic and swap-triggered snapshot capture
//! - **API**: read-only REST API over snapshots and live balances
//!
//! ## Quick Start
//!
//! ```bash
//! # Run migrations, then start monitoring
//! balancewatch db migrate
//! balancewatch serve
//!
//! # Inspect stored snapshots
//! balancewatch snapshots latest --kind periodic
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod api;
pub mod balance;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod monitor;
pub mod sources;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{AlertSink, ThresholdEvaluator};
    pub use crate::balance::BalanceAggregator;
    pub use crate::config::Config;
    pub use crate::db::{MemorySnapshotStore, PostgresSnapshotStore, SnapshotStore};
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::monitor::BalanceMonitor;
    pub use crate::sources::{ChannelBalanceSource, SourceRegistry, WalletBalanceSource};
}
