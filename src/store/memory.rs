//! In-memory store
//!
//! A transaction holds the store mutex for its whole life and works on a
//! private copy of the state; commit swaps the copy in, drop discards it.
//! That makes every transaction serializable.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{BettingStore, FailPoint, StoreError, StoreTx};
use crate::models::{
    Battle, BattleSnapshot, BattleStatus, Bet, BetStatus, BettingPool, Character, User,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    battles: HashMap<Uuid, Battle>,
    characters: HashMap<Uuid, Character>,
    /// battle id -> participant ids, in position order
    participants: HashMap<Uuid, Vec<Uuid>>,
    pools: HashMap<(Uuid, Uuid), BettingPool>,
    /// insertion order is placement order
    bets: Vec<Bet>,
}

impl MemoryState {
    fn snapshot(&self, battle_id: Uuid) -> Option<BattleSnapshot> {
        let battle = self.battles.get(&battle_id).cloned()?;

        let participants: Vec<Character> = self
            .participants
            .get(&battle_id)
            .map(|ids| ids.iter().filter_map(|id| self.characters.get(id).cloned()).collect())
            .unwrap_or_default();

        let pools: Vec<BettingPool> = self
            .pools
            .values()
            .filter(|p| p.battle_id == battle_id)
            .cloned()
            .collect();

        Some(BattleSnapshot {
            battle,
            participants,
            pools,
        })
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_point: Arc<parking_lot::Mutex<Option<FailPoint>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later transaction fail at `point` (or clear with `None`)
    pub fn fail_at(&self, point: Option<FailPoint>) {
        *self.fail_point.lock() = point;
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    pub async fn add_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    /// Register a battle together with its participants, in order
    pub async fn add_battle(&self, battle: Battle, participants: Vec<Character>) {
        let mut state = self.state.lock().await;
        let ids = participants.iter().map(|c| c.id).collect();
        for character in participants {
            state.characters.insert(character.id, character);
        }
        state.participants.insert(battle.id, ids);
        state.battles.insert(battle.id, battle);
    }

    pub async fn set_pool(&self, battle_id: Uuid, character_id: Uuid, volume: Decimal) {
        self.state.lock().await.pools.insert(
            (battle_id, character_id),
            BettingPool {
                battle_id,
                character_id,
                volume,
                updated_at: Utc::now(),
            },
        );
    }

    pub async fn add_bet(&self, bet: Bet) {
        self.state.lock().await.bets.push(bet);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub async fn user(&self, user_id: Uuid) -> Option<User> {
        self.state.lock().await.users.get(&user_id).cloned()
    }

    pub async fn battle(&self, battle_id: Uuid) -> Option<Battle> {
        self.state.lock().await.battles.get(&battle_id).cloned()
    }

    pub async fn bet(&self, bet_id: Uuid) -> Option<Bet> {
        self.state
            .lock()
            .await
            .bets
            .iter()
            .find(|b| b.id == bet_id)
            .cloned()
    }

    pub async fn bets_for(&self, battle_id: Uuid) -> Vec<Bet> {
        self.state
            .lock()
            .await
            .bets
            .iter()
            .filter(|b| b.battle_id == battle_id)
            .cloned()
            .collect()
    }

    pub async fn pool_volume(&self, battle_id: Uuid, character_id: Uuid) -> Decimal {
        self.state
            .lock()
            .await
            .pools
            .get(&(battle_id, character_id))
            .map(|p| p.volume)
            .unwrap_or(Decimal::ZERO)
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_point: Option<FailPoint>,
}

impl MemoryTx {
    fn check(&self, point: FailPoint) -> Result<(), StoreError> {
        if self.fail_point == Some(point) {
            return Err(StoreError::Injected(point));
        }
        Ok(())
    }
}

#[async_trait]
impl BettingStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            fail_point: *self.fail_point.lock(),
        }))
    }

    async fn battle_snapshot(&self, battle_id: Uuid) -> Result<Option<BattleSnapshot>, StoreError> {
        Ok(self.state.lock().await.snapshot(battle_id))
    }

    async fn overdue_battles(&self, started_before: DateTime<Utc>) -> Result<Vec<Battle>, StoreError> {
        let state = self.state.lock().await;
        let mut battles: Vec<Battle> = state
            .battles
            .values()
            .filter(|b| b.status.is_open() && b.start_time < started_before)
            .cloned()
            .collect();
        battles.sort_by_key(|b| b.start_time);
        Ok(battles)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_battle(&mut self, battle_id: Uuid) -> Result<Option<BattleSnapshot>, StoreError> {
        self.check(FailPoint::LockBattle)?;
        Ok(self.working.snapshot(battle_id))
    }

    async fn lock_account(&mut self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        self.check(FailPoint::LockAccount)?;
        Ok(self.working.users.get(&user_id).cloned())
    }

    async fn adjust_balance(&mut self, user_id: Uuid, delta: Decimal) -> Result<Decimal, StoreError> {
        self.check(FailPoint::AdjustBalance)?;

        let user = self
            .working
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::Conflict(format!("user {} not found", user_id)))?;

        let next = user.balance + delta;
        if next < Decimal::ZERO {
            return Err(StoreError::Conflict(format!(
                "balance of user {} cannot absorb {}",
                user_id, delta
            )));
        }
        user.balance = next;
        user.updated_at = Utc::now();
        Ok(next)
    }

    async fn insert_bet(&mut self, bet: &Bet) -> Result<(), StoreError> {
        self.check(FailPoint::InsertBet)?;
        self.working.bets.push(bet.clone());
        Ok(())
    }

    async fn increment_pool(
        &mut self,
        battle_id: Uuid,
        character_id: Uuid,
        delta: Decimal,
    ) -> Result<Decimal, StoreError> {
        self.check(FailPoint::IncrementPool)?;

        let pool = self
            .working
            .pools
            .entry((battle_id, character_id))
            .or_insert_with(|| BettingPool {
                battle_id,
                character_id,
                volume: Decimal::ZERO,
                updated_at: Utc::now(),
            });

        let next = pool.volume + delta;
        if next < Decimal::ZERO {
            return Err(StoreError::Conflict(format!(
                "pool {}:{} cannot absorb {}",
                battle_id, character_id, delta
            )));
        }
        pool.volume = next;
        pool.updated_at = Utc::now();
        Ok(next)
    }

    async fn battle_bets(&mut self, battle_id: Uuid) -> Result<Vec<Bet>, StoreError> {
        Ok(self
            .working
            .bets
            .iter()
            .filter(|b| b.battle_id == battle_id)
            .cloned()
            .collect())
    }

    async fn update_bet_status(
        &mut self,
        bet_id: Uuid,
        from: BetStatus,
        to: BetStatus,
        payout: Option<Decimal>,
    ) -> Result<(), StoreError> {
        self.check(FailPoint::UpdateBetStatus)?;
        if !from.can_transition_to(to) {
            return Err(StoreError::Conflict(format!(
                "bet {} cannot move from {} to {}",
                bet_id, from, to
            )));
        }

        let bet = self
            .working
            .bets
            .iter_mut()
            .find(|b| b.id == bet_id && b.status == from)
            .ok_or_else(|| StoreError::Conflict(format!("bet {} is no longer {}", bet_id, from)))?;

        bet.status = to;
        if payout.is_some() {
            bet.payout = payout;
        }
        if to.is_terminal() {
            bet.settled_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_battle_status(
        &mut self,
        battle_id: Uuid,
        from: BattleStatus,
        to: BattleStatus,
        winner_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        self.check(FailPoint::UpdateBattleStatus)?;

        let battle = self
            .working
            .battles
            .get_mut(&battle_id)
            .filter(|b| b.status == from)
            .ok_or_else(|| {
                StoreError::Conflict(format!("battle {} is no longer {}", battle_id, from))
            })?;

        battle.status = to;
        if winner_id.is_some() {
            battle.winner_id = winner_id;
        }
        if to.is_finalized() {
            battle.settled_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.check(FailPoint::Commit)?;
        let MemoryTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let user = User::new("0xabc", dec!(100));
        let user_id = user.id;
        store.add_user(user).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.adjust_balance(user_id, dec!(-40)).await.unwrap(), dec!(60));
        tx.commit().await.unwrap();

        assert_eq!(store.user(user_id).await.unwrap().balance, dec!(60));
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let store = MemoryStore::new();
        let user = User::new("0xabc", dec!(100));
        let user_id = user.id;
        store.add_user(user).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.adjust_balance(user_id, dec!(-40)).await.unwrap();
        }

        assert_eq!(store.user(user_id).await.unwrap().balance, dec!(100));
    }

    #[tokio::test]
    async fn test_negative_balance_rejected() {
        let store = MemoryStore::new();
        let user = User::new("0xabc", dec!(10));
        let user_id = user.id;
        store.add_user(user).await;

        let mut tx = store.begin().await.unwrap();
        let err = tx.adjust_balance(user_id, dec!(-10.5)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_fail_point() {
        let store = MemoryStore::new();
        store.fail_at(Some(FailPoint::IncrementPool));

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .increment_pool(Uuid::new_v4(), Uuid::new_v4(), dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Injected(FailPoint::IncrementPool)));
    }

    #[tokio::test]
    async fn test_guarded_bet_status_update() {
        let store = MemoryStore::new();
        let bet = Bet::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(10),
            dec!(10),
            None,
            BetStatus::Active,
        );
        let bet_id = bet.id;
        store.add_bet(bet).await;

        let mut tx = store.begin().await.unwrap();
        tx.update_bet_status(bet_id, BetStatus::Active, BetStatus::Won, Some(dec!(20)))
            .await
            .unwrap();
        let err = tx
            .update_bet_status(bet_id, BetStatus::Active, BetStatus::Lost, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        tx.commit().await.unwrap();

        let bet = store.bet(bet_id).await.unwrap();
        assert_eq!(bet.status, BetStatus::Won);
        assert_eq!(bet.payout, Some(dec!(20)));
        assert!(bet.settled_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_bet_cannot_be_reopened() {
        let store = MemoryStore::new();
        let bet = Bet::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(10),
            dec!(10),
            Some(dec!(2)),
            BetStatus::Won,
        );
        let bet_id = bet.id;
        store.add_bet(bet).await;

        let mut tx = store.begin().await.unwrap();
        for (from, to) in [
            (BetStatus::Won, BetStatus::Active),
            (BetStatus::Won, BetStatus::Lost),
            (BetStatus::Won, BetStatus::Cancelled),
            (BetStatus::Active, BetStatus::PendingLiquidity),
        ] {
            let err = tx.update_bet_status(bet_id, from, to, None).await.unwrap_err();
            assert!(matches!(err, StoreError::Conflict(_)), "{} -> {}", from, to);
        }
        tx.commit().await.unwrap();

        assert_eq!(store.bet(bet_id).await.unwrap().status, BetStatus::Won);
    }

    #[tokio::test]
    async fn test_snapshot_reads_committed_state() {
        let store = MemoryStore::new();
        let battle = Battle::new(
            "Snapshot",
            crate::models::MarketKind::TwoSided,
            crate::models::BettingMode::Amm,
            Utc::now(),
        );
        let battle_id = battle.id;
        let owner = Uuid::new_v4();
        let (a, b) = (Character::new("a", owner), Character::new("b", owner));
        let a_id = a.id;
        store.add_battle(battle, vec![a, b]).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.increment_pool(battle_id, a_id, dec!(5)).await.unwrap();
        }
        let snapshot = store.battle_snapshot(battle_id).await.unwrap().unwrap();
        assert_eq!(snapshot.participants.len(), 2);
        assert_eq!(snapshot.volume_of(a_id), Decimal::ZERO);

        let mut tx = store.begin().await.unwrap();
        tx.increment_pool(battle_id, a_id, dec!(5)).await.unwrap();
        tx.commit().await.unwrap();
        let snapshot = store.battle_snapshot(battle_id).await.unwrap().unwrap();
        assert_eq!(snapshot.volume_of(a_id), dec!(5));

        assert!(store.battle_snapshot(Uuid::new_v4()).await.unwrap().is_none());
    }
}
