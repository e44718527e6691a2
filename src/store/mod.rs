//! Transactional Store
//!
//! The engine never touches money state outside a [`StoreTx`]. A transaction
//! is opened with [`BettingStore::begin`], every read that feeds a decision is
//! made through it, and the writes become visible only on [`StoreTx::commit`].
//! Dropping a transaction without committing rolls it back.
//!
//! # Implementations
//!
//! - [`PgStore`]: Postgres via sqlx. `lock_battle` takes a row lock on the
//!   battle, which serializes placements and settlement per market.
//! - [`MemoryStore`]: in-process, one transaction at a time. Used by tests and
//!   for embedding; supports fault injection through [`FailPoint`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{Battle, BattleSnapshot, BattleStatus, Bet, BetStatus, User};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store operation that can be made to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    LockBattle,
    LockAccount,
    AdjustBalance,
    InsertBet,
    IncrementPool,
    UpdateBetStatus,
    UpdateBattleStatus,
    Commit,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A guarded write matched no row
    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Injected failure at {0:?}")]
    Injected(FailPoint),
}

/// One atomic unit of work against the store
#[async_trait]
pub trait StoreTx: Send {
    /// Load a battle with its participants and pools, locking the battle row
    /// for the rest of the transaction
    async fn lock_battle(&mut self, battle_id: Uuid) -> Result<Option<BattleSnapshot>, StoreError>;

    /// Load an account, locking its row
    async fn lock_account(&mut self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    /// Add `delta` (may be negative) to a balance and return the new balance.
    /// Fails with `Conflict` if the balance would go negative.
    async fn adjust_balance(&mut self, user_id: Uuid, delta: Decimal) -> Result<Decimal, StoreError>;

    async fn insert_bet(&mut self, bet: &Bet) -> Result<(), StoreError>;

    /// Add `delta` (may be negative) to a pool, creating the row if needed.
    /// Returns the new volume.
    async fn increment_pool(
        &mut self,
        battle_id: Uuid,
        character_id: Uuid,
        delta: Decimal,
    ) -> Result<Decimal, StoreError>;

    /// All bets of a battle, oldest first
    async fn battle_bets(&mut self, battle_id: Uuid) -> Result<Vec<Bet>, StoreError>;

    /// Move a bet from `from` to `to`, recording an optional payout.
    /// Fails with `Conflict` if the bet is no longer in `from`.
    async fn update_bet_status(
        &mut self,
        bet_id: Uuid,
        from: BetStatus,
        to: BetStatus,
        payout: Option<Decimal>,
    ) -> Result<(), StoreError>;

    /// Move a battle from `from` to `to`, recording the winner if given.
    /// Fails with `Conflict` if the battle is no longer in `from`.
    async fn update_battle_status(
        &mut self,
        battle_id: Uuid,
        from: BattleStatus,
        to: BattleStatus,
        winner_id: Option<Uuid>,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait BettingStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    /// Load a battle with its participants and pools without taking any
    /// lock. For quotes only: nothing read here may feed a write.
    async fn battle_snapshot(&self, battle_id: Uuid) -> Result<Option<BattleSnapshot>, StoreError>;

    /// Open battles whose start time is before `started_before`
    async fn overdue_battles(&self, started_before: DateTime<Utc>) -> Result<Vec<Battle>, StoreError>;
}
