//! Balance snapshot storage

use std::cmp::Reverse;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sqlx::types::Json;

use super::PostgresPool;
use crate::error::{Error, Result};
use crate::models::{
    BalanceData, BalanceSnapshot, NewSnapshot, SnapshotKind, SnapshotOrigin, SnapshotPage,
};

/// Persistent store of balance snapshots.
///
/// Snapshots are append-only. Every ordering is by timestamp, ties broken by id.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot and return it with its assigned id
    async fn add_snapshot(&self, snapshot: NewSnapshot) -> Result<BalanceSnapshot>;

    /// Most recent snapshot taken for a swap
    async fn get_by_swap_id(&self, swap_id: &str) -> Result<Option<BalanceSnapshot>>;

    /// Snapshots with `from <= timestamp <= to`, oldest first
    async fn get_by_time_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        kind: Option<SnapshotKind>,
    ) -> Result<Vec<BalanceSnapshot>>;

    /// Newest snapshot, optionally of one kind
    async fn get_latest(&self, kind: Option<SnapshotKind>) -> Result<Option<BalanceSnapshot>>;

    /// A page of snapshots, newest first, with the total count for the filter
    async fn get_snapshots(
        &self,
        limit: u32,
        offset: u64,
        kind: Option<SnapshotKind>,
    ) -> Result<SnapshotPage>;

    /// Check that the backing storage is reachable
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

const SNAPSHOT_COLUMNS: &str = "id, snapshot_type, swap_id, swap_type, timestamp, balances";

// Rows written before the discriminator existed have no snapshot_type and are swap snapshots.
const KIND_FILTER: &str = "($1::text IS NULL OR COALESCE(snapshot_type, 'swap') = $1)";

#[derive(Debug, sqlx::FromRow)]
struct SnapshotRow {
    id: i64,
    snapshot_type: Option<String>,
    swap_id: Option<String>,
    swap_type: Option<String>,
    timestamp: DateTime<Utc>,
    balances: Json<BalanceData>,
}

impl TryFrom<SnapshotRow> for BalanceSnapshot {
    type Error = Error;

    fn try_from(row: SnapshotRow) -> Result<Self> {
        let origin = match (row.snapshot_type.as_deref(), row.swap_id, row.swap_type) {
            (Some("periodic"), None, None) => SnapshotOrigin::Periodic,
            (Some("swap") | None, Some(swap_id), Some(swap_type)) => {
                SnapshotOrigin::Swap { swap_id, swap_type }
            }
            (kind, _, _) => {
                return Err(Error::internal(format!(
                    "snapshot {} has inconsistent type {:?} and swap linkage",
                    row.id, kind
                )))
            }
        };

        Ok(Self {
            id: row.id,
            origin,
            timestamp: row.timestamp,
            balances: row.balances.0,
        })
    }
}

fn into_snapshots(rows: Vec<SnapshotRow>) -> Result<Vec<BalanceSnapshot>> {
    rows.into_iter().map(BalanceSnapshot::try_from).collect()
}

/// Snapshot store backed by the `balance_snapshots` table
#[derive(Debug, Clone)]
pub struct PostgresSnapshotStore {
    pool: PostgresPool,
}

impl PostgresSnapshotStore {
    /// Create a store on an existing pool
    pub fn new(pool: &PostgresPool) -> Self {
        Self { pool: pool.clone() }
    }
}

#[async_trait]
impl SnapshotStore for PostgresSnapshotStore {
    async fn add_snapshot(&self, snapshot: NewSnapshot) -> Result<BalanceSnapshot> {
        let (swap_id, swap_type) = match &snapshot.origin {
            SnapshotOrigin::Periodic => (None, None),
            SnapshotOrigin::Swap { swap_id, swap_type } => {
                (Some(swap_id.as_str()), Some(swap_type.as_str()))
            }
        };

        let (id, timestamp): (i64, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO balance_snapshots (snapshot_type, swap_id, swap_type, timestamp, balances)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, timestamp
            "#,
        )
        .bind(snapshot.origin.kind().as_str())
        .bind(swap_id)
        .bind(swap_type)
        .bind(snapshot.timestamp)
        .bind(Json(&snapshot.balances))
        .fetch_one(self.pool.pool())
        .await?;

        // The column keeps microseconds, return what a later read will see
        Ok(BalanceSnapshot {
            timestamp,
            ..BalanceSnapshot::from_new(id, snapshot)
        })
    }

    async fn get_by_swap_id(&self, swap_id: &str) -> Result<Option<BalanceSnapshot>> {
        let row: Option<SnapshotRow> = sqlx::query_as(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM balance_snapshots \
             WHERE swap_id = $1 ORDER BY timestamp DESC, id DESC LIMIT 1"
        ))
        .bind(swap_id)
        .fetch_optional(self.pool.pool())
        .await?;

        row.map(BalanceSnapshot::try_from).transpose()
    }

    async fn get_by_time_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        kind: Option<SnapshotKind>,
    ) -> Result<Vec<BalanceSnapshot>> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM balance_snapshots \
             WHERE {KIND_FILTER} AND timestamp >= $2 AND timestamp <= $3 \
             ORDER BY timestamp ASC, id ASC"
        ))
        .bind(kind.map(SnapshotKind::as_str))
        .bind(from)
        .bind(to)
        .fetch_all(self.pool.pool())
        .await?;

        into_snapshots(rows)
    }

    async fn get_latest(&self, kind: Option<SnapshotKind>) -> Result<Option<BalanceSnapshot>> {
        let row: Option<SnapshotRow> = sqlx::query_as(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM balance_snapshots \
             WHERE {KIND_FILTER} ORDER BY timestamp DESC, id DESC LIMIT 1"
        ))
        .bind(kind.map(SnapshotKind::as_str))
        .fetch_optional(self.pool.pool())
        .await?;

        row.map(BalanceSnapshot::try_from).transpose()
    }

    async fn get_snapshots(
        &self,
        limit: u32,
        offset: u64,
        kind: Option<SnapshotKind>,
    ) -> Result<SnapshotPage> {
        let kind = kind.map(SnapshotKind::as_str);

        let rows: Vec<SnapshotRow> = sqlx::query_as(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM balance_snapshots \
             WHERE {KIND_FILTER} ORDER BY timestamp DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(kind)
        .bind(i64::from(limit))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(self.pool.pool())
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM balance_snapshots WHERE {KIND_FILTER}"
        ))
        .bind(kind)
        .fetch_one(self.pool.pool())
        .await?;

        Ok(SnapshotPage {
            snapshots: into_snapshots(rows)?,
            total,
        })
    }

    async fn health_check(&self) -> Result<()> {
        self.pool.health_check().await
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    next_id: i64,
    snapshots: Vec<BalanceSnapshot>,
}

/// In-process snapshot store.
///
/// Used by `serve --memory` and tests. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    inner: RwLock<MemoryInner>,
}

impl MemorySnapshotStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots
    pub fn len(&self) -> usize {
        self.inner.read().snapshots.len()
    }

    /// Whether nothing has been stored yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Matching snapshots, oldest first
    fn matching(&self, kind: Option<SnapshotKind>) -> Vec<BalanceSnapshot> {
        let mut snapshots: Vec<_> = self
            .inner
            .read()
            .snapshots
            .iter()
            .filter(|s| kind.map_or(true, |kind| s.kind() == kind))
            .cloned()
            .collect();
        snapshots.sort_by_key(|s| (s.timestamp, s.id));
        snapshots
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn add_snapshot(&self, snapshot: NewSnapshot) -> Result<BalanceSnapshot> {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let stored = BalanceSnapshot::from_new(inner.next_id, snapshot);
        inner.snapshots.push(stored.clone());
        Ok(stored)
    }

    async fn get_by_swap_id(&self, swap_id: &str) -> Result<Option<BalanceSnapshot>> {
        Ok(self
            .matching(Some(SnapshotKind::Swap))
            .into_iter()
            .rev()
            .find(|s| s.swap_id() == Some(swap_id)))
    }

    async fn get_by_time_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        kind: Option<SnapshotKind>,
    ) -> Result<Vec<BalanceSnapshot>> {
        Ok(self
            .matching(kind)
            .into_iter()
            .filter(|s| s.timestamp >= from && s.timestamp <= to)
            .collect())
    }

    async fn get_latest(&self, kind: Option<SnapshotKind>) -> Result<Option<BalanceSnapshot>> {
        Ok(self.matching(kind).pop())
    }

    async fn get_snapshots(
        &self,
        limit: u32,
        offset: u64,
        kind: Option<SnapshotKind>,
    ) -> Result<SnapshotPage> {
        let mut snapshots = self.matching(kind);
        let total = i64::try_from(snapshots.len()).unwrap_or(i64::MAX);

        snapshots.sort_by_key(|s| Reverse((s.timestamp, s.id)));
        let snapshots = snapshots
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize)
            .collect();

        Ok(SnapshotPage { snapshots, total })
    }
}
