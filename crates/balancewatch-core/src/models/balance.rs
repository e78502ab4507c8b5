//! Balance and snapshot data models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Balance reported by a wallet source, in the smallest currency unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WalletBalance {
    /// Balance with enough confirmations to spend
    pub confirmed_balance: u64,
    /// Pending balance; negative while outgoing transactions are unconfirmed
    pub unconfirmed_balance: i64,
}

/// Balances of a single payment channel, in the smallest currency unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelBalance {
    /// Our side of the channel
    pub local_balance: u64,
    /// The peer's side of the channel
    pub remote_balance: u64,
}

/// Wallet balance of one service for one symbol at capture time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalanceEntry {
    /// Currency symbol
    pub symbol: String,
    /// Name of the wallet backend
    pub service: String,
    /// Confirmed balance
    pub confirmed: u64,
    /// Unconfirmed balance (may be negative while spends are pending)
    pub unconfirmed: i64,
}

impl WalletBalanceEntry {
    /// Build an entry from a source reading
    pub fn new(symbol: impl Into<String>, service: impl Into<String>, balance: WalletBalance) -> Self {
        Self {
            symbol: symbol.into(),
            service: service.into(),
            confirmed: balance.confirmed_balance,
            unconfirmed: balance.unconfirmed_balance,
        }
    }

    /// Confirmed plus unconfirmed balance
    pub fn total(&self) -> i128 {
        i128::from(self.confirmed) + i128::from(self.unconfirmed)
    }
}

/// Channel balance totals of one Lightning service for one symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningBalanceEntry {
    /// Currency symbol
    pub symbol: String,
    /// Name of the channel backend
    pub service: String,
    /// Sum of local balances over all open channels
    pub local: u64,
    /// Sum of remote balances over all open channels
    pub remote: u64,
}

impl LightningBalanceEntry {
    /// Sum a channel list into a single entry.
    ///
    /// Accumulates in `u128` and saturates at `u64::MAX` when narrowing.
    pub fn from_channels(
        symbol: impl Into<String>,
        service: impl Into<String>,
        channels: &[ChannelBalance],
    ) -> Self {
        let (local, remote) = channels.iter().fold((0u128, 0u128), |(local, remote), channel| {
            (
                local + u128::from(channel.local_balance),
                remote + u128::from(channel.remote_balance),
            )
        });

        Self {
            symbol: symbol.into(),
            service: service.into(),
            local: u64::try_from(local).unwrap_or(u64::MAX),
            remote: u64::try_from(remote).unwrap_or(u64::MAX),
        }
    }
}

/// A point-in-time set of balances
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BalanceData {
    /// One entry per wallet source and symbol that answered
    pub wallets: Vec<WalletBalanceEntry>,
    /// Channel totals per source and symbol
    pub lightning: Vec<LightningBalanceEntry>,
}

impl BalanceData {
    /// Wallet entries for a symbol
    pub fn wallets_for<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a WalletBalanceEntry> {
        self.wallets.iter().filter(move |w| w.symbol == symbol)
    }

    /// Lightning entries for a symbol
    pub fn lightning_for<'a>(
        &'a self,
        symbol: &'a str,
    ) -> impl Iterator<Item = &'a LightningBalanceEntry> {
        self.lightning.iter().filter(move |l| l.symbol == symbol)
    }
}

/// Why a snapshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    /// Scheduled sweep over every configured symbol
    Periodic,
    /// Taken after a swap completed
    Swap,
}

impl SnapshotKind {
    /// Database and wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Periodic => "periodic",
            Self::Swap => "swap",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "periodic" => Ok(Self::Periodic),
            "swap" => Ok(Self::Swap),
            other => Err(Error::validation(format!("unknown snapshot kind: {other}"))),
        }
    }
}

/// Snapshot discriminator together with its swap linkage.
///
/// A swap id and type exist exactly when the snapshot is swap-triggered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "snapshot_type", rename_all = "lowercase")]
pub enum SnapshotOrigin {
    /// Scheduled sweep
    Periodic,
    /// Swap-triggered capture
    Swap {
        /// Identifier of the swap
        swap_id: String,
        /// Human-readable swap category
        swap_type: String,
    },
}

impl SnapshotOrigin {
    /// The kind of this origin
    pub fn kind(&self) -> SnapshotKind {
        match self {
            Self::Periodic => SnapshotKind::Periodic,
            Self::Swap { .. } => SnapshotKind::Swap,
        }
    }
}

/// A snapshot that has not been written yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSnapshot {
    /// Why the snapshot is taken
    pub origin: SnapshotOrigin,
    /// Aggregation start
    pub timestamp: DateTime<Utc>,
    /// Captured balances
    pub balances: BalanceData,
}

impl NewSnapshot {
    /// A periodic snapshot
    pub fn periodic(timestamp: DateTime<Utc>, balances: BalanceData) -> Self {
        Self {
            origin: SnapshotOrigin::Periodic,
            timestamp,
            balances,
        }
    }

    /// A swap-triggered snapshot
    pub fn swap(
        swap_id: impl Into<String>,
        swap_type: impl Into<String>,
        timestamp: DateTime<Utc>,
        balances: BalanceData,
    ) -> Self {
        Self {
            origin: SnapshotOrigin::Swap {
                swap_id: swap_id.into(),
                swap_type: swap_type.into(),
            },
            timestamp,
            balances,
        }
    }
}

/// A persisted balance snapshot. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    /// Store-assigned, monotonically increasing id
    pub id: i64,
    /// Periodic, or the swap the snapshot belongs to
    #[serde(flatten)]
    pub origin: SnapshotOrigin,
    /// Aggregation start
    pub timestamp: DateTime<Utc>,
    /// Captured balances
    pub balances: BalanceData,
}

impl BalanceSnapshot {
    /// Attach a store id to a new snapshot
    pub fn from_new(id: i64, snapshot: NewSnapshot) -> Self {
        Self {
            id,
            origin: snapshot.origin,
            timestamp: snapshot.timestamp,
            balances: snapshot.balances,
        }
    }

    /// The snapshot kind
    pub fn kind(&self) -> SnapshotKind {
        self.origin.kind()
    }

    /// The originating swap id, for swap-triggered snapshots
    pub fn swap_id(&self) -> Option<&str> {
        match &self.origin {
            SnapshotOrigin::Swap { swap_id, .. } => Some(swap_id),
            SnapshotOrigin::Periodic => None,
        }
    }

    /// The originating swap type label, for swap-triggered snapshots
    pub fn swap_type(&self) -> Option<&str> {
        match &self.origin {
            SnapshotOrigin::Swap { swap_type, .. } => Some(swap_type),
            SnapshotOrigin::Periodic => None,
        }
    }
}

/// One page of snapshots plus the number of snapshots matching the filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPage {
    /// Snapshots on this page, newest first
    pub snapshots: Vec<BalanceSnapshot>,
    /// Matching snapshots across all pages
    pub total: i64,
}
