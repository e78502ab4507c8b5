//! Concurrent balance gathering across all registered sources

use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::models::{BalanceData, LightningBalanceEntry, WalletBalanceEntry};
use crate::sources::{ChannelBalanceSource, SourceError, SourceRegistry, WalletBalanceSource};

/// Gathers a point-in-time balance set from every relevant source.
///
/// A failing or unresponsive source is logged and left out of the result; it
/// never aborts the queries of other sources.
#[derive(Debug, Clone)]
pub struct BalanceAggregator {
    registry: SourceRegistry,
    source_timeout: Duration,
}

impl BalanceAggregator {
    /// Create an aggregator over a source registry
    pub fn new(registry: SourceRegistry, source_timeout: Duration) -> Self {
        Self {
            registry,
            source_timeout,
        }
    }

    /// Symbols with at least one registered source
    pub fn symbols(&self) -> Vec<String> {
        self.registry.symbols()
    }

    /// Fetch balances for `symbols`, or for every registered symbol when `None`.
    ///
    /// Channel sources are only queried when `include_lightning` is set. Returns
    /// once every launched query has succeeded, failed or timed out.
    pub async fn get_balances(
        &self,
        symbols: Option<&[String]>,
        include_lightning: bool,
    ) -> BalanceData {
        let symbols = match symbols {
            Some(symbols) => symbols.to_vec(),
            None => self.registry.symbols(),
        };

        let mut wallet_queries = Vec::new();
        let mut channel_queries = Vec::new();

        for symbol in &symbols {
            let Some(sources) = self.registry.get(symbol) else {
                debug!(symbol, "No balance sources registered");
                continue;
            };

            for wallet in &sources.wallets {
                wallet_queries.push(self.query_wallet(symbol, wallet.as_ref()));
            }

            if include_lightning {
                for client in &sources.channels {
                    channel_queries.push(self.query_channels(symbol, client.as_ref()));
                }
            }
        }

        debug!(
            symbols = symbols.len(),
            wallet_queries = wallet_queries.len(),
            channel_queries = channel_queries.len(),
            "Gathering balances"
        );

        let (wallets, lightning) =
            futures::join!(join_all(wallet_queries), join_all(channel_queries));

        BalanceData {
            wallets: wallets.into_iter().flatten().collect(),
            lightning: lightning.into_iter().flatten().collect(),
        }
    }

    async fn query_wallet(
        &self,
        symbol: &str,
        source: &dyn WalletBalanceSource,
    ) -> Option<WalletBalanceEntry> {
        let result = timeout(self.source_timeout, source.get_balance(symbol))
            .await
            .unwrap_or(Err(SourceError::Timeout(self.source_timeout)));

        match result {
            Ok(balance) => Some(WalletBalanceEntry::new(symbol, source.service_name(), balance)),
            Err(e) => {
                warn!(
                    symbol,
                    service = source.service_name(),
                    error = %e,
                    "Failed to get wallet balance"
                );
                metrics::counter!("balancewatch_source_failures_total", "kind" => "wallet")
                    .increment(1);
                None
            }
        }
    }

    async fn query_channels(
        &self,
        symbol: &str,
        source: &dyn ChannelBalanceSource,
    ) -> Option<LightningBalanceEntry> {
        let result = timeout(self.source_timeout, source.list_channels())
            .await
            .unwrap_or(Err(SourceError::Timeout(self.source_timeout)));

        match result {
            Ok(channels) => Some(LightningBalanceEntry::from_channels(
                symbol,
                source.service_name(),
                &channels,
            )),
            Err(e) => {
                warn!(
                    symbol,
                    service = source.service_name(),
                    error = %e,
                    "Failed to get Lightning balance"
                );
                metrics::counter!("balancewatch_source_failures_total", "kind" => "lightning")
                    .increment(1);
                None
            }
        }
    }
}
