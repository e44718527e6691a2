//! Betting engine services

pub mod betting;
pub mod book;
pub mod error;
pub mod lifecycle;
pub mod liquidity;
pub mod monitor;
pub mod odds;
pub mod parimutuel;
pub mod payout;

mod guards;

#[cfg(test)]
mod fixtures;

pub use betting::BettingManager;
pub use error::{BettingError, ErrorKind};
pub use lifecycle::LifecycleManager;
pub use monitor::SettlementMonitor;
pub use parimutuel::ParimutuelManager;
pub use payout::SettlementSummary;
