use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Bet lifecycle status
///
/// Transitions only move forward:
/// `PendingLiquidity -> Active -> Won | Lost`, and any non-terminal status
/// may become `Cancelled`. Terminal bets are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "bet_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    /// Matched and live
    Active,
    /// Parimutuel bet waiting for the opposing side to be funded
    PendingLiquidity,
    Won,
    Lost,
    Cancelled,
}

impl BetStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BetStatus::Won | BetStatus::Lost | BetStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: BetStatus) -> bool {
        use BetStatus::*;
        match (self, next) {
            (PendingLiquidity, Active) => true,
            (PendingLiquidity, Cancelled) => true,
            (Active, Won) | (Active, Lost) | (Active, Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Active => "active",
            BetStatus::PendingLiquidity => "pending_liquidity",
            BetStatus::Won => "won",
            BetStatus::Lost => "lost",
            BetStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Bet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub battle_id: Uuid,
    pub character_id: Uuid,
    /// Gross stake debited from the account
    pub amount: Decimal,
    /// What the stake added to its pool (gross in AMM mode, net of fee in parimutuel mode)
    pub pool_contribution: Decimal,
    /// Odds captured at placement (AMM mode only)
    pub odds: Option<Decimal>,
    pub status: BetStatus,
    /// Amount credited back at settlement or refund
    pub payout: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Bet {
    pub fn new(
        user_id: Uuid,
        battle_id: Uuid,
        character_id: Uuid,
        amount: Decimal,
        pool_contribution: Decimal,
        odds: Option<Decimal>,
        status: BetStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            battle_id,
            character_id,
            amount,
            pool_contribution,
            odds,
            status,
            payout: None,
            created_at: Utc::now(),
            settled_at: None,
        }
    }
}
