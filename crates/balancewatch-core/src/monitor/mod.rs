//! Snapshot capture orchestration
//!
//! The monitor owns the schedule: a periodic sweep over every symbol that also
//! feeds the threshold evaluator, and swap-triggered captures received over a
//! bounded channel. Nothing that fails in here is propagated to the process.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::alerting::ThresholdEvaluator;
use crate::balance::BalanceAggregator;
use crate::config::MonitorConfig;
use crate::db::SnapshotStore;
use crate::models::{split_pair_id, BalanceSnapshot, NewSnapshot, SwapEvent};

const MIN_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

/// Periodic and swap-triggered balance capture
pub struct BalanceMonitor {
    aggregator: BalanceAggregator,
    evaluator: Arc<ThresholdEvaluator>,
    store: Arc<dyn SnapshotStore>,
    snapshot_interval: Duration,
    swap_tx: mpsc::Sender<SwapEvent>,
    swap_rx: Mutex<Option<mpsc::Receiver<SwapEvent>>>,
}

impl BalanceMonitor {
    /// Create a monitor. The swap queue is sized from `config.swap_queue_size`.
    ///
    /// A zero queue size is raised to one and the snapshot interval to at
    /// least one second.
    pub fn new(
        aggregator: BalanceAggregator,
        evaluator: Arc<ThresholdEvaluator>,
        store: Arc<dyn SnapshotStore>,
        config: &MonitorConfig,
    ) -> Self {
        if config.swap_queue_size == 0 || config.snapshot_interval < MIN_SNAPSHOT_INTERVAL {
            warn!(
                swap_queue_size = config.swap_queue_size,
                snapshot_interval = ?config.snapshot_interval,
                "Monitor settings below minimum, clamping"
            );
        }

        let (swap_tx, swap_rx) = mpsc::channel(config.swap_queue_size.max(1));

        Self {
            aggregator,
            evaluator,
            store,
            snapshot_interval: config.snapshot_interval.max(MIN_SNAPSHOT_INTERVAL),
            swap_tx,
            swap_rx: Mutex::new(Some(swap_rx)),
        }
    }

    /// Sender for completed swaps, serviced by [`BalanceMonitor::run`]
    pub fn swap_sender(&self) -> mpsc::Sender<SwapEvent> {
        self.swap_tx.clone()
    }

    /// Queue a swap for capture without waiting.
    ///
    /// Returns `false` when the event was dropped because the queue is full or
    /// the monitor has stopped.
    pub fn notify_swap(&self, event: SwapEvent) -> bool {
        match self.swap_tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(swap_id = %event.swap_id, "Swap snapshot queue full, dropping event");
                metrics::counter!("balancewatch_snapshot_failures_total", "kind" => "swap")
                    .increment(1);
                false
            }
            Err(TrySendError::Closed(event)) => {
                warn!(swap_id = %event.swap_id, "Balance monitor stopped, dropping swap event");
                false
            }
        }
    }

    /// Aggregate every symbol including channels, store the result as a periodic
    /// snapshot and run the threshold checks on it.
    ///
    /// Persistence and alerting are independent: either runs even when the
    /// other fails. Returns the stored snapshot, if it could be written.
    pub async fn capture_periodic_snapshot(&self) -> Option<BalanceSnapshot> {
        let timestamp = Utc::now();
        let balances = self.aggregator.get_balances(None, true).await;

        let snapshot = NewSnapshot::periodic(timestamp, balances.clone());
        let (stored, alerts) = futures::join!(
            self.persist(snapshot),
            self.evaluator.check_thresholds(&balances)
        );

        debug!(
            wallets = balances.wallets.len(),
            lightning = balances.lightning.len(),
            alerts = alerts.len(),
            "Periodic balance check finished"
        );

        stored
    }

    /// Aggregate the two symbols of the swap's pair and store the result.
    ///
    /// Channel balances are only included for swaps with a Lightning leg.
    pub async fn capture_swap_snapshot(&self, event: &SwapEvent) -> Option<BalanceSnapshot> {
        let (base, quote) = match split_pair_id(&event.pair) {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!(swap_id = %event.swap_id, error = %e, "Cannot capture swap snapshot");
                metrics::counter!("balancewatch_snapshot_failures_total", "kind" => "swap")
                    .increment(1);
                return None;
            }
        };

        let mut symbols = vec![base.to_string()];
        if quote != base {
            symbols.push(quote.to_string());
        }

        let timestamp = Utc::now();
        let balances = self
            .aggregator
            .get_balances(Some(&symbols), event.swap_type.has_lightning_leg())
            .await;

        self.persist(NewSnapshot::swap(
            event.swap_id.clone(),
            event.swap_type.pretty(),
            timestamp,
            balances,
        ))
        .await
    }

    /// Service the periodic schedule and swap events until `shutdown` fires or
    /// its sender is dropped.
    ///
    /// The first periodic capture runs immediately.
    pub async fn run(&self, mut shutdown: mpsc::Receiver<()>) {
        let Some(mut swap_rx) = self.swap_rx.lock().take() else {
            error!("Balance monitor already started");
            return;
        };

        let mut ticker = interval(self.snapshot_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval = ?self.snapshot_interval,
            symbols = self.aggregator.symbols().len(),
            thresholds = self.evaluator.thresholds().len(),
            "Balance monitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Balance monitor stopped");
                    break;
                }

                Some(event) = swap_rx.recv() => {
                    self.capture_swap_snapshot(&event).await;
                }

                _ = ticker.tick() => {
                    self.capture_periodic_snapshot().await;
                }
            }
        }
    }

    async fn persist(&self, snapshot: NewSnapshot) -> Option<BalanceSnapshot> {
        let kind = snapshot.origin.kind();

        match self.store.add_snapshot(snapshot).await {
            Ok(stored) => {
                debug!(
                    id = stored.id,
                    kind = %kind,
                    swap_id = stored.swap_id(),
                    "Balance snapshot saved"
                );
                metrics::counter!("balancewatch_snapshots_written_total", "kind" => kind.as_str())
                    .increment(1);
                Some(stored)
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "Failed to save balance snapshot");
                metrics::counter!("balancewatch_snapshot_failures_total", "kind" => kind.as_str())
                    .increment(1);
                None
            }
        }
    }
}
