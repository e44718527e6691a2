//! Betting error taxonomy

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{BattleStatus, BettingMode};
use crate::store::StoreError;

/// Errors surfaced by the betting and settlement managers.
///
/// Every variant aborts the enclosing store transaction. None of them is
/// retried by the engine.
#[derive(Debug, thiserror::Error)]
pub enum BettingError {
    #[error("Battle not found: {0}")]
    MarketNotFound(Uuid),

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("Character {character_id} is not part of battle {battle_id}")]
    InvalidParticipant { battle_id: Uuid, character_id: Uuid },

    #[error("Betting is closed for battle {battle_id} (status: {status})")]
    MarketClosed { battle_id: Uuid, status: BattleStatus },

    #[error("Insufficient balance: {available} < {required}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    #[error("Liquidity constraint: bet needs {required} of counter-liquidity, {available} available")]
    LiquidityConstraint { required: Decimal, available: Decimal },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Battle {battle_id} is priced in {expected} mode, not {actual}")]
    ModeMismatch {
        battle_id: Uuid,
        expected: BettingMode,
        actual: BettingMode,
    },

    #[error("Bet of {amount} exceeds the {cap} cap for an unmatched side")]
    BetCapExceeded { amount: Decimal, cap: Decimal },

    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Coarse error classes presented to API layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    MarketClosed,
    InsufficientBalance,
    LiquidityConstraint,
    InvalidState,
    BetCapExceeded,
    InvalidRequest,
    Storage,
}

impl ErrorKind {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::MarketClosed => "MARKET_CLOSED",
            ErrorKind::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ErrorKind::LiquidityConstraint => "LIQUIDITY_CONSTRAINT",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::BetCapExceeded => "BET_CAP_EXCEEDED",
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
            ErrorKind::Storage => "STORAGE_ERROR",
        }
    }
}

impl BettingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BettingError::MarketNotFound(_)
            | BettingError::AccountNotFound(_)
            | BettingError::InvalidParticipant { .. } => ErrorKind::NotFound,
            BettingError::MarketClosed { .. } => ErrorKind::MarketClosed,
            BettingError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            BettingError::LiquidityConstraint { .. } => ErrorKind::LiquidityConstraint,
            BettingError::InvalidState(_) | BettingError::ModeMismatch { .. } => {
                ErrorKind::InvalidState
            }
            BettingError::BetCapExceeded { .. } => ErrorKind::BetCapExceeded,
            BettingError::InvalidAmount(_) => ErrorKind::InvalidRequest,
            BettingError::Store(_) => ErrorKind::Storage,
        }
    }

    /// Business-rule rejections, as opposed to storage failures
    pub fn is_rejection(&self) -> bool {
        !matches!(self, BettingError::Store(_))
    }
}
