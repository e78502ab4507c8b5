//! Alert message formatting

use serde::Serialize;

use crate::models::{BalanceCheck, BalanceKind};

const CHECKMARK: &str = "\u{2705}";
const ROTATING_LIGHT: &str = "\u{1F6A8}";

/// Format an amount in the smallest unit as coins with 8 decimals, grouping
/// the decimals as `0.01,000,000`.
pub fn format_satcomma(amount: i128) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let amount = amount.unsigned_abs();
    let decimals = format!("{:08}", amount % 100_000_000);
    let (first, rest) = decimals.split_at(2);
    let (second, third) = rest.split_at(3);

    format!("{sign}{}.{first},{second},{third}", amount / 100_000_000)
}

/// A balance crossing into or out of its bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceAlert {
    /// Currency symbol
    pub symbol: String,
    /// Wallet or channel backend the balance came from
    pub service: String,
    /// Which balance was checked
    pub kind: BalanceKind,
    /// Balance at evaluation time
    pub balance: i128,
    /// `false` when the alert is raised, `true` when it clears
    pub in_bounds: bool,
    /// Bound that was crossed
    #[serde(skip)]
    pub check: BalanceCheck,
}

impl BalanceAlert {
    /// Whether this notification reports a problem rather than a recovery
    pub fn is_problem(&self) -> bool {
        !self.in_bounds
    }

    /// Operator-facing message including the violated bound
    pub fn message(&self) -> String {
        let name = format!("{} {}", self.symbol, self.service);
        let balance = format_satcomma(self.balance);

        match (self.in_bounds, self.check) {
            (true, BalanceCheck::MainWallet { .. } | BalanceCheck::UnusedWallet { .. }) => {
                format!("{CHECKMARK} {name} wallet balance of {balance} is in bounds again {CHECKMARK}")
            }
            (true, BalanceCheck::ChannelLocal { min } | BalanceCheck::ChannelRemote { min }) => {
                format!(
                    "{CHECKMARK} {name} {} channel balance of {balance} is more than expected {} again {CHECKMARK}",
                    self.side(),
                    format_satcomma(i128::from(min)),
                )
            }
            (false, BalanceCheck::MainWallet { min, max }) => {
                let max = max
                    .map(|max| format!("    Max: {}\n", format_satcomma(i128::from(max))))
                    .unwrap_or_default();
                format!(
                    "{ROTATING_LIGHT} **{name} wallet balance is out of bounds** {ROTATING_LIGHT}\n  Balance: {balance}\n{max}    Min: {}",
                    format_satcomma(i128::from(min)),
                )
            }
            (false, BalanceCheck::UnusedWallet { max }) => {
                format!(
                    "{ROTATING_LIGHT} **{name} wallet balance is out of bounds** {ROTATING_LIGHT}\n  Balance: {balance}\n    Max: {}",
                    format_satcomma(i128::from(max)),
                )
            }
            (false, BalanceCheck::ChannelLocal { min } | BalanceCheck::ChannelRemote { min }) => {
                format!(
                    "{ROTATING_LIGHT} **{name} {} channel balance of {balance} is less than expected {}** {ROTATING_LIGHT}",
                    self.side(),
                    format_satcomma(i128::from(min)),
                )
            }
        }
    }

    fn side(&self) -> &'static str {
        match self.kind {
            BalanceKind::ChannelRemote => "remote",
            _ => "local",
        }
    }
}
