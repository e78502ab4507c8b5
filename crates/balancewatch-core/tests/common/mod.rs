//! Shared fakes for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use balancewatch::alerting::{AlertSink, NotificationError};
use balancewatch::models::{ChannelBalance, WalletBalance};
use balancewatch::sources::{ChannelBalanceSource, SourceError, WalletBalanceSource};

/// Wallet whose balance can be changed between captures
pub struct FakeWallet {
    service: String,
    balance: AtomicU64,
    failing: bool,
}

impl FakeWallet {
    pub fn new(service: &str, balance: u64) -> Arc<Self> {
        Arc::new(Self {
            service: service.to_string(),
            balance: AtomicU64::new(balance),
            failing: false,
        })
    }

    pub fn failing(service: &str) -> Arc<Self> {
        Arc::new(Self {
            service: service.to_string(),
            balance: AtomicU64::new(0),
            failing: true,
        })
    }

    pub fn set_balance(&self, balance: u64) {
        self.balance.store(balance, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl WalletBalanceSource for FakeWallet {
    fn service_name(&self) -> &str {
        &self.service
    }

    async fn get_balance(&self, _symbol: &str) -> Result<WalletBalance, SourceError> {
        if self.failing {
            return Err(SourceError::Rpc("connection refused".to_string()));
        }

        Ok(WalletBalance {
            confirmed_balance: self.balance.load(Ordering::SeqCst),
            unconfirmed_balance: 0,
        })
    }
}

/// Channel client with a fixed channel list
pub struct FakeChannels {
    service: String,
    channels: Vec<ChannelBalance>,
}

impl FakeChannels {
    pub fn new(service: &str, locals: &[u64]) -> Arc<Self> {
        Arc::new(Self {
            service: service.to_string(),
            channels: locals
                .iter()
                .map(|&local| ChannelBalance {
                    local_balance: local,
                    remote_balance: 1_000,
                })
                .collect(),
        })
    }
}

#[async_trait::async_trait]
impl ChannelBalanceSource for FakeChannels {
    fn service_name(&self) -> &str {
        &self.service
    }

    async fn list_channels(&self) -> Result<Vec<ChannelBalance>, SourceError> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(self.channels.clone())
    }
}

/// Sink recording every delivered message with its problem flag
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(String, bool)>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<(String, bool)> {
        self.messages.lock().clone()
    }
}

#[async_trait::async_trait]
impl AlertSink for RecordingSink {
    async fn send(
        &self,
        message: &str,
        _urgent: bool,
        is_problem: bool,
    ) -> Result<(), NotificationError> {
        self.messages.lock().push((message.to_string(), is_problem));
        Ok(())
    }
}
