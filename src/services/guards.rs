//! Preconditions shared by the managers
//!
//! Every check that feeds a write reads through the caller's open
//! transaction, so the decision and the writes that follow it see the same
//! rows. Quotes are the one exception and read without locking.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::book::MarketBook;
use super::error::BettingError;
use crate::models::{BattleSnapshot, BettingMode, User};
use crate::store::{BettingStore, StoreTx};

/// Everything a placement decision is computed from
pub(crate) struct BetContext {
    pub book: MarketBook,
    pub account: User,
}

/// A proposed bet, before any check has run
#[derive(Debug, Clone, Copy)]
pub(crate) struct BetRequest {
    pub user_id: Uuid,
    pub battle_id: Uuid,
    pub character_id: Uuid,
    pub amount: Decimal,
}

/// Lock the battle and the account and run the checks common to both modes:
/// existence, mode, betting window, participant and balance.
pub(crate) async fn load_bet_context(
    tx: &mut dyn StoreTx,
    request: &BetRequest,
    mode: BettingMode,
    lock_window: Duration,
    now: DateTime<Utc>,
) -> Result<BetContext, BettingError> {
    if request.amount <= Decimal::ZERO {
        return Err(BettingError::InvalidAmount(request.amount));
    }

    let snapshot = tx
        .lock_battle(request.battle_id)
        .await?
        .ok_or(BettingError::MarketNotFound(request.battle_id))?;
    let account = tx
        .lock_account(request.user_id)
        .await?
        .ok_or(BettingError::AccountNotFound(request.user_id))?;

    let battle = &snapshot.battle;
    ensure_mode(battle.id, battle.mode, mode)?;

    if !battle.is_betting_open(now, lock_window) {
        return Err(BettingError::MarketClosed {
            battle_id: battle.id,
            status: battle.status,
        });
    }

    if !snapshot.has_participant(request.character_id) {
        return Err(BettingError::InvalidParticipant {
            battle_id: battle.id,
            character_id: request.character_id,
        });
    }

    if !account.can_afford(request.amount) {
        return Err(BettingError::InsufficientBalance {
            required: request.amount,
            available: account.balance,
        });
    }

    let book = MarketBook::from_snapshot(&snapshot)?;
    Ok(BetContext { book, account })
}

/// Lock a battle that is about to be settled or cancelled.
///
/// Fails with `InvalidState` unless the battle is still open, which is what
/// keeps a battle from being settled twice.
pub(crate) async fn lock_open_battle(
    tx: &mut dyn StoreTx,
    battle_id: Uuid,
    mode: Option<BettingMode>,
) -> Result<BattleSnapshot, BettingError> {
    let snapshot = tx
        .lock_battle(battle_id)
        .await?
        .ok_or(BettingError::MarketNotFound(battle_id))?;

    if let Some(mode) = mode {
        ensure_mode(battle_id, snapshot.battle.mode, mode)?;
    }

    if !snapshot.battle.status.is_open() {
        return Err(BettingError::InvalidState(format!(
            "battle {} is {}",
            battle_id, snapshot.battle.status
        )));
    }

    Ok(snapshot)
}

/// Build the book for a quote from an unlocked read.
///
/// Quotes never wait on placements or settlement; a bet re-reads the pools
/// under lock before it is priced.
pub(crate) async fn load_book(
    store: &dyn BettingStore,
    battle_id: Uuid,
    mode: BettingMode,
) -> Result<MarketBook, BettingError> {
    let snapshot = store
        .battle_snapshot(battle_id)
        .await?
        .ok_or(BettingError::MarketNotFound(battle_id))?;
    ensure_mode(battle_id, snapshot.battle.mode, mode)?;
    MarketBook::from_snapshot(&snapshot)
}

fn ensure_mode(battle_id: Uuid, actual: BettingMode, expected: BettingMode) -> Result<(), BettingError> {
    if actual != expected {
        return Err(BettingError::ModeMismatch {
            battle_id,
            expected,
            actual,
        });
    }
    Ok(())
}
