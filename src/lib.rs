//! Arena betting engine
//!
//! Odds, liquidity-checked bet placement and settlement for character battles,
//! in fixed-odds (AMM) and parimutuel modes.

pub mod config;
pub mod db;
pub mod events;
pub mod metrics;
pub mod models;
pub mod money;
pub mod services;
pub mod store;
