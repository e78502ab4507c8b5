//! Balance threshold models

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Wallet service treated as the main wallet when no preference is configured
pub const DEFAULT_PREFERRED_WALLET: &str = "lnd";

/// Kind of balance being checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceKind {
    /// On-chain wallet balance (confirmed + unconfirmed)
    Wallet,
    /// Sum of local channel balances
    ChannelLocal,
    /// Sum of remote channel balances
    ChannelRemote,
}

impl BalanceKind {
    /// Label used in metrics and logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wallet => "wallet",
            Self::ChannelLocal => "channel_local",
            Self::ChannelRemote => "channel_remote",
        }
    }
}

/// Alerting thresholds for one currency symbol.
///
/// All amounts are in the smallest currency unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CurrencyThreshold {
    /// Currency symbol
    pub symbol: String,

    /// Wallet service treated as the main wallet (defaults to `lnd`)
    #[serde(default)]
    pub preferred_wallet: Option<String>,

    /// Lower bound of the main wallet
    pub min_wallet_balance: u64,

    /// Upper bound of the main wallet (unbounded when absent)
    #[serde(default)]
    pub max_wallet_balance: Option<u64>,

    /// Upper bound for wallets that are not the main wallet
    #[serde(default)]
    pub max_unused_wallet_balance: Option<u64>,

    /// Lower bound of the summed local channel balance
    #[serde(default)]
    pub min_local_balance: Option<u64>,

    /// Lower bound of the summed remote channel balance
    #[serde(default)]
    pub min_remote_balance: Option<u64>,
}

impl CurrencyThreshold {
    /// Thresholds with only a minimum main wallet balance
    pub fn new(symbol: impl Into<String>, min_wallet_balance: u64) -> Self {
        Self {
            symbol: symbol.into(),
            min_wallet_balance,
            ..Self::default()
        }
    }

    /// Name of the main wallet service
    pub fn preferred_wallet(&self) -> &str {
        self.preferred_wallet
            .as_deref()
            .unwrap_or(DEFAULT_PREFERRED_WALLET)
    }

    /// Whether `service` is the main wallet for this symbol
    pub fn is_main_wallet(&self, service: &str, is_only_wallet: bool) -> bool {
        is_only_wallet || self.preferred_wallet().eq_ignore_ascii_case(service)
    }

    /// Check to apply to a wallet balance, `None` when the wallet is not checked
    pub fn wallet_check(&self, service: &str, is_only_wallet: bool) -> Option<BalanceCheck> {
        if self.is_main_wallet(service, is_only_wallet) {
            Some(BalanceCheck::MainWallet {
                min: self.min_wallet_balance,
                max: self.max_wallet_balance,
            })
        } else {
            self.max_unused_wallet_balance
                .map(|max| BalanceCheck::UnusedWallet { max })
        }
    }

    /// Check to apply to the local channel balance, if configured
    pub fn local_check(&self) -> Option<BalanceCheck> {
        self.min_local_balance
            .map(|min| BalanceCheck::ChannelLocal { min })
    }

    /// Check to apply to the remote channel balance, if configured
    pub fn remote_check(&self) -> Option<BalanceCheck> {
        self.min_remote_balance
            .map(|min| BalanceCheck::ChannelRemote { min })
    }

    /// Validate the threshold definition
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(Error::validation("threshold symbol must not be empty"));
        }

        if let Some(max) = self.max_wallet_balance {
            if max < self.min_wallet_balance {
                return Err(Error::validation(format!(
                    "{}: max_wallet_balance {} is below min_wallet_balance {}",
                    self.symbol, max, self.min_wallet_balance
                )));
            }
        }

        Ok(())
    }
}

/// A bound rule for a single balance, tagged by balance kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceCheck {
    /// Main wallet: `min <= total <= max`
    MainWallet {
        /// Lower bound
        min: u64,
        /// Upper bound, if any
        max: Option<u64>,
    },
    /// Any other wallet: `total <= max`
    UnusedWallet {
        /// Upper bound
        max: u64,
    },
    /// `local >= min`
    ChannelLocal {
        /// Lower bound on local balance
        min: u64,
    },
    /// `remote >= min`
    ChannelRemote {
        /// Lower bound on remote balance
        min: u64,
    },
}

impl BalanceCheck {
    /// The balance kind this check applies to
    pub fn kind(&self) -> BalanceKind {
        match self {
            Self::MainWallet { .. } | Self::UnusedWallet { .. } => BalanceKind::Wallet,
            Self::ChannelLocal { .. } => BalanceKind::ChannelLocal,
            Self::ChannelRemote { .. } => BalanceKind::ChannelRemote,
        }
    }

    /// Whether the balance satisfies this check
    pub fn is_in_bounds(&self, balance: i128) -> bool {
        match *self {
            Self::MainWallet { min, max } => {
                i128::from(min) <= balance && max.map_or(true, |max| balance <= i128::from(max))
            }
            Self::UnusedWallet { max } => balance <= i128::from(max),
            Self::ChannelLocal { min } | Self::ChannelRemote { min } => balance >= i128::from(min),
        }
    }
}
