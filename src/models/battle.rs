//! Battle (market), character and pool models
//!
//! A battle is the betting market; its characters are the sides a bettor can
//! back and each (battle, character) pair owns one betting pool.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Market shape
///
/// Two-sided markets ("team battles") have exactly two characters,
/// multi-sided markets ("battle royale") have two or more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "battle_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    TwoSided,
    MultiSided,
}

impl MarketKind {
    /// Check a participant count against the market shape
    pub fn accepts_participants(&self, count: usize) -> bool {
        match self {
            MarketKind::TwoSided => count == 2,
            MarketKind::MultiSided => count >= 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKind::TwoSided => "two_sided",
            MarketKind::MultiSided => "multi_sided",
        }
    }
}

impl std::fmt::Display for MarketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which manager prices and settles the battle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "betting_mode", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BettingMode {
    /// Fixed odds captured at placement, gross stake into the pool
    Amm,
    /// Pool-share payout, net stake into the pool
    Parimutuel,
}

impl BettingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BettingMode::Amm => "amm",
            BettingMode::Parimutuel => "parimutuel",
        }
    }
}

impl std::fmt::Display for BettingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Battle lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "battle_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BattleStatus {
    /// Created, bets already permitted
    Pending,
    /// Live, bets permitted until the lock window
    Active,
    /// Settled with a winner
    Finished,
    /// Called off, every stake refunded
    Cancelled,
}

impl BattleStatus {
    /// Statuses in which bets and settlement are allowed
    pub fn is_open(&self) -> bool {
        matches!(self, BattleStatus::Pending | BattleStatus::Active)
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self, BattleStatus::Finished | BattleStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BattleStatus::Pending => "pending",
            BattleStatus::Active => "active",
            BattleStatus::Finished => "finished",
            BattleStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BattleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Betting market
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Battle {
    pub id: Uuid,
    pub title: String,
    pub kind: MarketKind,
    pub mode: BettingMode,
    /// Scheduled start; betting locks `lock_window` before it
    pub start_time: DateTime<Utc>,
    pub status: BattleStatus,
    /// Set once, by settlement
    pub winner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Battle {
    pub fn new(
        title: impl Into<String>,
        kind: MarketKind,
        mode: BettingMode,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            kind,
            mode,
            start_time,
            status: BattleStatus::Pending,
            winner_id: None,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    /// Last instant (exclusive) at which a bet is accepted
    pub fn betting_deadline(&self, lock_window: Duration) -> DateTime<Utc> {
        self.start_time - lock_window
    }

    /// Whether a bet may be placed at `now`.
    ///
    /// Evaluated per request from the row itself; there is no cached lock flag.
    pub fn is_betting_open(&self, now: DateTime<Utc>, lock_window: Duration) -> bool {
        self.status.is_open() && now < self.betting_deadline(lock_window)
    }
}

/// A battle participant
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Character {
    pub id: Uuid,
    pub name: String,
    /// Account that owns the character
    pub owner_id: Uuid,
}

impl Character {
    pub fn new(name: impl Into<String>, owner_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            owner_id,
        }
    }
}

/// Accumulated stake volume for one (battle, character) pair
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BettingPool {
    pub battle_id: Uuid,
    pub character_id: Uuid,
    pub volume: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// A battle read inside a transaction together with its participants and pools
#[derive(Debug, Clone)]
pub struct BattleSnapshot {
    pub battle: Battle,
    pub participants: Vec<Character>,
    pub pools: Vec<BettingPool>,
}

impl BattleSnapshot {
    pub fn has_participant(&self, character_id: Uuid) -> bool {
        self.participants.iter().any(|c| c.id == character_id)
    }

    /// Pool volume for a participant; a missing pool row reads as zero
    pub fn volume_of(&self, character_id: Uuid) -> Decimal {
        self.pools
            .iter()
            .find(|p| p.character_id == character_id)
            .map(|p| p.volume)
            .unwrap_or(Decimal::ZERO)
    }

    /// Participants paired with their pool volumes, in participant order
    pub fn volumes(&self) -> Vec<(Uuid, Decimal)> {
        self.participants
            .iter()
            .map(|c| (c.id, self.volume_of(c.id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn battle_starting_in(minutes: i64) -> Battle {
        Battle::new(
            "Red vs Blue",
            MarketKind::TwoSided,
            BettingMode::Amm,
            Utc::now() + Duration::minutes(minutes),
        )
    }

    #[test]
    fn test_battle_status_open() {
        assert!(BattleStatus::Pending.is_open());
        assert!(BattleStatus::Active.is_open());
        assert!(!BattleStatus::Finished.is_open());
        assert!(!BattleStatus::Cancelled.is_open());
        assert!(BattleStatus::Finished.is_finalized());
    }

    #[test]
    fn test_lock_window() {
        let window = Duration::minutes(2);
        let now = Utc::now();

        let battle = battle_starting_in(10);
        assert!(battle.is_betting_open(now, window));

        // exactly at the deadline is closed
        let deadline = battle.betting_deadline(window);
        assert!(!battle.is_betting_open(deadline, window));
        assert!(battle.is_betting_open(deadline - Duration::milliseconds(1), window));

        let soon = battle_starting_in(1);
        assert!(!soon.is_betting_open(now, window));
    }

    #[test]
    fn test_finished_battle_is_closed() {
        let mut battle = battle_starting_in(60);
        battle.status = BattleStatus::Finished;
        assert!(!battle.is_betting_open(Utc::now(), Duration::minutes(2)));
    }

    #[test]
    fn test_kind_participant_counts() {
        assert!(MarketKind::TwoSided.accepts_participants(2));
        assert!(!MarketKind::TwoSided.accepts_participants(3));
        assert!(MarketKind::MultiSided.accepts_participants(5));
        assert!(!MarketKind::MultiSided.accepts_participants(1));
    }

    #[test]
    fn test_snapshot_missing_pool_reads_zero() {
        let owner = Uuid::new_v4();
        let a = Character::new("A", owner);
        let b = Character::new("B", owner);
        let battle = battle_starting_in(60);
        let snapshot = BattleSnapshot {
            pools: vec![BettingPool {
                battle_id: battle.id,
                character_id: a.id,
                volume: dec!(42),
                updated_at: Utc::now(),
            }],
            participants: vec![a.clone(), b.clone()],
            battle,
        };
        assert_eq!(snapshot.volume_of(a.id), dec!(42));
        assert_eq!(snapshot.volume_of(b.id), Decimal::ZERO);
        assert_eq!(snapshot.volumes(), vec![(a.id, dec!(42)), (b.id, Decimal::ZERO)]);
    }
}
