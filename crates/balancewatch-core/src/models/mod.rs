//! Data models for BalanceWatch

mod balance;
mod swap;
mod threshold;

pub use balance::*;
pub use swap::*;
pub use threshold::*;
