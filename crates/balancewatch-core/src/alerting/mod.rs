//! Alerting for BalanceWatch
//!
//! Edge-triggered threshold checks over aggregated balances, and delivery of the
//! resulting messages.

mod evaluator;
mod message;
mod notifier;

pub use evaluator::{AlertState, ThresholdEvaluator};
pub use message::{format_satcomma, BalanceAlert};
pub use notifier::{AlertSink, LogSink, NotificationError, WebhookSink};
