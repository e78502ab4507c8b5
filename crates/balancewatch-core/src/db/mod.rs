//! Database layer for BalanceWatch
//!
//! Provides the PostgreSQL pool and the balance snapshot stores.

mod postgres;
mod snapshot;

pub use postgres::PostgresPool;
pub use snapshot::{MemorySnapshotStore, PostgresSnapshotStore, SnapshotStore};
