//! Parimutuel Settlement Manager
//!
//! Pool-share betting with a split-fee refund model:
//! 1. Every stake pays the house fee up front; only the net amount enters the pool
//! 2. A bet on a side with no opposing money is capped and held as PendingLiquidity
//! 3. Funding the other side promotes held bets to Active
//! 4. Settlement refunds held bets minus the immediate fee, then splits the
//!    losing pools among winners pro rata to their net stake

mod manager;

pub use manager::ParimutuelManager;
