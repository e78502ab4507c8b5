//! Edge-triggered balance threshold evaluation

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::models::{BalanceCheck, BalanceData, BalanceKind, CurrencyThreshold};

use super::message::BalanceAlert;
use super::notifier::AlertSink;

/// Identifiers (`symbol` + `service`) currently alerting, one set per balance kind.
///
/// Lives in memory only: after a restart every set is empty, so a balance
/// that is still out of bounds raises once more.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertState {
    wallet: HashSet<String>,
    channel_local: HashSet<String>,
    channel_remote: HashSet<String>,
}

impl AlertState {
    fn set(&self, kind: BalanceKind) -> &HashSet<String> {
        match kind {
            BalanceKind::Wallet => &self.wallet,
            BalanceKind::ChannelLocal => &self.channel_local,
            BalanceKind::ChannelRemote => &self.channel_remote,
        }
    }

    fn set_mut(&mut self, kind: BalanceKind) -> &mut HashSet<String> {
        match kind {
            BalanceKind::Wallet => &mut self.wallet,
            BalanceKind::ChannelLocal => &mut self.channel_local,
            BalanceKind::ChannelRemote => &mut self.channel_remote,
        }
    }

    /// Whether `symbol`/`service` is alerting for `kind`
    pub fn is_alerting(&self, kind: BalanceKind, symbol: &str, service: &str) -> bool {
        self.set(kind).contains(&alert_ident(symbol, service))
    }

    /// Number of active alerts for `kind`
    pub fn active(&self, kind: BalanceKind) -> usize {
        self.set(kind).len()
    }

    /// Record an observation and report whether it is an edge.
    ///
    /// Returns `Some(false)` when an alert is raised, `Some(true)` when one
    /// clears and `None` when the balance stays on the same side.
    fn observe(&mut self, kind: BalanceKind, ident: String, in_bounds: bool) -> Option<bool> {
        let set = self.set_mut(kind);
        match (set.contains(&ident), in_bounds) {
            (false, false) => {
                set.insert(ident);
                Some(false)
            }
            (true, true) => {
                set.remove(&ident);
                Some(true)
            }
            _ => None,
        }
    }
}

fn alert_ident(symbol: &str, service: &str) -> String {
    format!("{symbol}{service}")
}

/// Checks balances against configured thresholds and notifies once per transition
pub struct ThresholdEvaluator {
    thresholds: Vec<CurrencyThreshold>,
    state: Mutex<AlertState>,
    sink: Option<Arc<dyn AlertSink>>,
}

impl ThresholdEvaluator {
    /// Create an evaluator with empty alert state
    pub fn new(thresholds: Vec<CurrencyThreshold>, sink: Option<Arc<dyn AlertSink>>) -> Self {
        Self {
            thresholds,
            state: Mutex::new(AlertState::default()),
            sink,
        }
    }

    /// Configured thresholds
    pub fn thresholds(&self) -> &[CurrencyThreshold] {
        &self.thresholds
    }

    /// Copy of the current alert state
    pub fn state(&self) -> AlertState {
        self.state.lock().clone()
    }

    /// Evaluate `balances` and commit every state transition.
    ///
    /// The whole pass runs under the state lock, so concurrent evaluations
    /// never interleave their membership changes.
    pub fn evaluate(&self, balances: &BalanceData) -> Vec<BalanceAlert> {
        let mut state = self.state.lock();
        let mut alerts = Vec::new();

        for threshold in &self.thresholds {
            let wallets: Vec<_> = balances.wallets_for(&threshold.symbol).collect();
            let is_only_wallet = wallets.len() == 1;

            for wallet in wallets {
                if let Some(check) = threshold.wallet_check(&wallet.service, is_only_wallet) {
                    alerts.extend(observe(
                        &mut state,
                        threshold,
                        &wallet.service,
                        check,
                        wallet.total(),
                    ));
                } else {
                    debug!(
                        symbol = %threshold.symbol,
                        service = %wallet.service,
                        "Skipping unused wallet without a balance cap"
                    );
                }
            }

            for ln in balances.lightning_for(&threshold.symbol) {
                if let Some(check) = threshold.local_check() {
                    alerts.extend(observe(
                        &mut state,
                        threshold,
                        &ln.service,
                        check,
                        i128::from(ln.local),
                    ));
                }

                if let Some(check) = threshold.remote_check() {
                    alerts.extend(observe(
                        &mut state,
                        threshold,
                        &ln.service,
                        check,
                        i128::from(ln.remote),
                    ));
                }
            }
        }

        alerts
    }

    /// Evaluate `balances` and deliver a notification for every transition.
    ///
    /// Delivery failures are logged; the committed state is left untouched.
    pub async fn check_thresholds(&self, balances: &BalanceData) -> Vec<BalanceAlert> {
        let alerts = self.evaluate(balances);

        if let Some(sink) = &self.sink {
            for alert in &alerts {
                let message = alert.message();
                if let Err(e) = sink.send(&message, true, alert.is_problem()).await {
                    error!(
                        symbol = %alert.symbol,
                        service = %alert.service,
                        error = %e,
                        "Failed to deliver balance alert"
                    );
                    metrics::counter!("balancewatch_alert_delivery_failures_total").increment(1);
                }
            }
        }

        alerts
    }
}

fn observe(
    state: &mut AlertState,
    threshold: &CurrencyThreshold,
    service: &str,
    check: BalanceCheck,
    balance: i128,
) -> Option<BalanceAlert> {
    let kind = check.kind();
    let in_bounds = check.is_in_bounds(balance);
    let in_bounds = state.observe(kind, alert_ident(&threshold.symbol, service), in_bounds)?;

    if in_bounds {
        info!(
            symbol = %threshold.symbol,
            service,
            kind = kind.as_str(),
            balance = %balance,
            "Balance back in bounds"
        );
    } else {
        warn!(
            symbol = %threshold.symbol,
            service,
            kind = kind.as_str(),
            balance = %balance,
            "Balance out of bounds"
        );
    }

    let transition = if in_bounds { "cleared" } else { "raised" };
    metrics::counter!(
        "balancewatch_alerts_total",
        "kind" => kind.as_str(),
        "transition" => transition
    )
    .increment(1);

    Some(BalanceAlert {
        symbol: threshold.symbol.clone(),
        service: service.to_string(),
        kind,
        balance,
        in_bounds,
        check,
    })
}
