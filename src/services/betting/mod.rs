//! Betting Manager (AMM mode)
//!
//! Fixed-odds betting against the market maker:
//! 1. The odds engine quotes the battle from its current pools
//! 2. The liquidity validator bounds the profit a bet may win
//! 3. Debit, bet insert and pool increment commit together
//! 4. Settlement pays each winner `amount * odds` captured at placement

mod manager;

pub use manager::BettingManager;
