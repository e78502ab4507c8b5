//! Balance sources
//!
//! Wallet and channel backends are implemented elsewhere; this module defines the
//! contracts the aggregator consumes and a registry mapping symbols to sources.

mod evm;

pub use evm::EvmRpcWallet;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{ChannelBalance, WalletBalance};

/// Errors reported by balance sources
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Transport failure or an error reply from the backend
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Reply could not be decoded
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// No reply within the source timeout
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// A wallet that can report its balance
#[async_trait::async_trait]
pub trait WalletBalanceSource: Send + Sync {
    /// Name of the wallet backend
    fn service_name(&self) -> &str;

    /// Current confirmed and unconfirmed balance for `symbol`
    async fn get_balance(&self, symbol: &str) -> Result<WalletBalance, SourceError>;
}

/// A payment channel client that can list its channels
#[async_trait::async_trait]
pub trait ChannelBalanceSource: Send + Sync {
    /// Name of the channel backend
    fn service_name(&self) -> &str;

    /// Local and remote balances of every open channel
    async fn list_channels(&self) -> Result<Vec<ChannelBalance>, SourceError>;
}

/// Sources registered for a single symbol
#[derive(Clone, Default)]
pub struct SymbolSources {
    /// Wallet backends holding the symbol
    pub wallets: Vec<Arc<dyn WalletBalanceSource>>,
    /// Channel backends settling the symbol
    pub channels: Vec<Arc<dyn ChannelBalanceSource>>,
}

/// Symbol to source mapping used by the aggregator
#[derive(Clone, Default)]
pub struct SourceRegistry {
    symbols: BTreeMap<String, SymbolSources>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wallet source for a symbol
    pub fn add_wallet(
        &mut self,
        symbol: impl Into<String>,
        source: Arc<dyn WalletBalanceSource>,
    ) -> &mut Self {
        self.symbols
            .entry(symbol.into())
            .or_default()
            .wallets
            .push(source);
        self
    }

    /// Register a channel source for a symbol
    pub fn add_channels(
        &mut self,
        symbol: impl Into<String>,
        source: Arc<dyn ChannelBalanceSource>,
    ) -> &mut Self {
        self.symbols
            .entry(symbol.into())
            .or_default()
            .channels
            .push(source);
        self
    }

    /// All symbols with at least one source, in sorted order
    pub fn symbols(&self) -> Vec<String> {
        self.symbols.keys().cloned().collect()
    }

    /// Sources for a symbol
    pub fn get(&self, symbol: &str) -> Option<&SymbolSources> {
        self.symbols.get(symbol)
    }

    /// Whether no sources are registered
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (symbol, sources) in &self.symbols {
            let wallets: Vec<&str> = sources.wallets.iter().map(|w| w.service_name()).collect();
            let channels: Vec<&str> = sources.channels.iter().map(|c| c.service_name()).collect();
            map.entry(symbol, &(wallets, channels));
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait::async_trait]
    impl WalletBalanceSource for Named {
        fn service_name(&self) -> &str {
            self.0
        }

        async fn get_balance(&self, _symbol: &str) -> Result<WalletBalance, SourceError> {
            Ok(WalletBalance::default())
        }
    }

    #[async_trait::async_trait]
    impl ChannelBalanceSource for Named {
        fn service_name(&self) -> &str {
            self.0
        }

        async fn list_channels(&self) -> Result<Vec<ChannelBalance>, SourceError> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_registry_groups_by_symbol() {
        let mut registry = SourceRegistry::new();
        registry
            .add_wallet("L-BTC", Arc::new(Named("Elements")))
            .add_wallet("BTC", Arc::new(Named("LND")))
            .add_channels("BTC", Arc::new(Named("LND")))
            .add_channels("BTC", Arc::new(Named("CLN")));

        assert_eq!(registry.symbols(), vec!["BTC".to_string(), "L-BTC".to_string()]);

        let btc = registry.get("BTC").unwrap();
        assert_eq!(btc.wallets.len(), 1);
        assert_eq!(btc.channels.len(), 2);
        assert!(registry.get("RBTC").is_none());
    }

    #[test]
    fn test_timeout_message() {
        let err = SourceError::Timeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "Timed out after 10s");
    }
}
