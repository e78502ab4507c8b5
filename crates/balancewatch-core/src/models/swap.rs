//! Swap types relevant to balance capture

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Category of a swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapType {
    /// Chain to Lightning
    Submarine,
    /// Lightning to chain
    ReverseSubmarine,
    /// Chain to chain
    Chain,
}

impl SwapType {
    /// Human-readable label stored with swap snapshots
    pub fn pretty(self) -> &'static str {
        match self {
            Self::Submarine => "Submarine",
            Self::ReverseSubmarine => "Reverse",
            Self::Chain => "Chain",
        }
    }

    /// Whether one leg of the swap settles over Lightning
    pub fn has_lightning_leg(self) -> bool {
        matches!(self, Self::Submarine | Self::ReverseSubmarine)
    }
}

impl fmt::Display for SwapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pretty())
    }
}

impl FromStr for SwapType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "submarine" => Ok(Self::Submarine),
            "reverse" | "reverse_submarine" | "reversesubmarine" => Ok(Self::ReverseSubmarine),
            "chain" => Ok(Self::Chain),
            other => Err(Error::validation(format!("unknown swap type: {other}"))),
        }
    }
}

/// Split a pair id such as `L-BTC/BTC` into its base and quote symbols
pub fn split_pair_id(pair: &str) -> Result<(&str, &str)> {
    match pair.split_once('/') {
        Some((base, quote)) if !base.is_empty() && !quote.is_empty() && !quote.contains('/') => {
            Ok((base, quote))
        }
        _ => Err(Error::validation(format!("invalid pair id: {pair}"))),
    }
}

/// A completed swap whose balances should be captured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapEvent {
    /// Swap identifier the snapshot is linked to
    pub swap_id: String,
    /// Swap category, decides whether channel balances are captured
    pub swap_type: SwapType,
    /// Trading pair, e.g. `BTC/BTC` or `L-BTC/BTC`
    pub pair: String,
}

impl SwapEvent {
    /// Create a swap event
    pub fn new(swap_id: impl Into<String>, swap_type: SwapType, pair: impl Into<String>) -> Self {
        Self {
            swap_id: swap_id.into(),
            swap_type,
            pair: pair.into(),
        }
    }
}
