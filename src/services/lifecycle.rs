//! Battle lifecycle
//!
//! Opening a battle for live play and calling it off. Works for both betting
//! modes: a cancelled battle returns every unsettled stake in full, house fee
//! included, and takes each bet's contribution back out of its pool.

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::config::EnginePolicy;
use crate::events::{EventPublisher, PoolUpdateReason};
use crate::metrics::REFUNDS;
use crate::models::{BattleStatus, BetStatus};
use crate::services::book::MarketBook;
use crate::services::error::BettingError;
use crate::services::guards;
use crate::services::payout::{Credits, SettlementSummary};
use crate::store::BettingStore;

pub struct LifecycleManager {
    store: Arc<dyn BettingStore>,
    policy: EnginePolicy,
    events: EventPublisher,
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn BettingStore>, policy: EnginePolicy, events: EventPublisher) -> Self {
        Self {
            store,
            policy,
            events,
        }
    }

    /// Pending -> Active
    pub async fn open_battle(&self, battle_id: Uuid) -> Result<(), BettingError> {
        let mut tx = self.store.begin().await?;
        let snapshot = guards::lock_open_battle(tx.as_mut(), battle_id, None).await?;

        if snapshot.battle.status != BattleStatus::Pending {
            return Err(BettingError::InvalidState(format!(
                "battle {} is already {}",
                battle_id, snapshot.battle.status
            )));
        }

        tx.update_battle_status(battle_id, BattleStatus::Pending, BattleStatus::Active, None)
            .await?;
        tx.commit().await?;

        info!("Battle {} is now active", battle_id);
        Ok(())
    }

    /// Cancel an open battle and refund every unsettled bet its gross stake
    pub async fn cancel_battle(&self, battle_id: Uuid) -> Result<SettlementSummary, BettingError> {
        match self.try_cancel(battle_id).await {
            Ok((summary, book)) => {
                info!(
                    "Battle {} cancelled: refunded {} bets, total {}",
                    battle_id, summary.bets_refunded, summary.total_refunded
                );
                if summary.bets_refunded > 0 {
                    metrics::counter!(REFUNDS, "reason" => "battle_cancelled")
                        .increment(summary.bets_refunded as u64);
                }
                self.events
                    .publish(battle_id, PoolUpdateReason::Cancelled, &book, &self.policy.odds);
                Ok(summary)
            }
            Err(e) => {
                error!("Cancellation of battle {} failed: {}", battle_id, e);
                Err(e)
            }
        }
    }

    async fn try_cancel(&self, battle_id: Uuid) -> Result<(SettlementSummary, MarketBook), BettingError> {
        let mut tx = self.store.begin().await?;
        let snapshot = guards::lock_open_battle(tx.as_mut(), battle_id, None).await?;
        let mut book = MarketBook::from_snapshot(&snapshot)?;

        let mut summary = SettlementSummary::new(battle_id, None);
        let mut credits = Credits::default();

        for bet in tx.battle_bets(battle_id).await? {
            if bet.status.is_terminal() {
                continue;
            }
            tx.increment_pool(battle_id, bet.character_id, -bet.pool_contribution)
                .await?;
            book.apply(bet.character_id, -bet.pool_contribution);
            tx.update_bet_status(bet.id, bet.status, BetStatus::Cancelled, Some(bet.amount))
                .await?;
            credits.add(bet.user_id, bet.amount);
            summary.bets_refunded += 1;
            summary.total_refunded += bet.amount;
        }

        credits.apply(tx.as_mut()).await?;
        tx.update_battle_status(battle_id, snapshot.battle.status, BattleStatus::Cancelled, None)
            .await?;
        tx.commit().await?;

        Ok((summary, book))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BettingMode, MarketKind};
    use crate::services::betting::BettingManager;
    use crate::services::fixtures::Arena;
    use crate::services::parimutuel::ParimutuelManager;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn lifecycle(arena: &Arena) -> LifecycleManager {
        LifecycleManager::new(arena.store.clone(), EnginePolicy::default(), EventPublisher::new(16))
    }

    #[tokio::test]
    async fn test_open_battle() {
        let arena = Arena::new(MarketKind::TwoSided, BettingMode::Amm, 2).await;
        let manager = lifecycle(&arena);

        manager.open_battle(arena.battle_id).await.unwrap();
        let battle = arena.store.battle(arena.battle_id).await.unwrap();
        assert_eq!(battle.status, BattleStatus::Active);

        let err = manager.open_battle(arena.battle_id).await.unwrap_err();
        assert!(matches!(err, BettingError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_bets_accepted_while_active() {
        let arena = Arena::new(MarketKind::TwoSided, BettingMode::Amm, 2).await;
        let alice = arena.user(dec!(100)).await;
        lifecycle(&arena).open_battle(arena.battle_id).await.unwrap();

        let betting = BettingManager::new(arena.store.clone(), EnginePolicy::default(), EventPublisher::new(4));
        betting
            .place_bet(alice, arena.battle_id, arena.characters[0], dec!(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_refunds_gross_stake() {
        let arena = Arena::new(MarketKind::TwoSided, BettingMode::Parimutuel, 2).await;
        let alice = arena.user(dec!(100)).await;
        let bob = arena.user(dec!(100)).await;
        let parimutuel = ParimutuelManager::new(arena.store.clone(), EnginePolicy::default(), EventPublisher::new(4));

        let held = parimutuel
            .place_bet(alice, arena.battle_id, arena.characters[0], dec!(40))
            .await
            .unwrap();
        parimutuel
            .place_bet(bob, arena.battle_id, arena.characters[1], dec!(60))
            .await
            .unwrap();

        let events = EventPublisher::new(4);
        let mut rx = events.subscribe();
        let manager = LifecycleManager::new(arena.store.clone(), EnginePolicy::default(), events);
        let summary = manager.cancel_battle(arena.battle_id).await.unwrap();

        assert_eq!(summary.bets_refunded, 2);
        assert_eq!(summary.total_refunded, dec!(100));
        assert_eq!(arena.balance(alice).await, dec!(100));
        assert_eq!(arena.balance(bob).await, dec!(100));
        assert_eq!(arena.pool(0).await, Decimal::ZERO);
        assert_eq!(arena.pool(1).await, Decimal::ZERO);

        let bet = arena.store.bet(held.id).await.unwrap();
        assert_eq!(bet.status, BetStatus::Cancelled);
        assert_eq!(bet.payout, Some(dec!(40)));

        let battle = arena.store.battle(arena.battle_id).await.unwrap();
        assert_eq!(battle.status, BattleStatus::Cancelled);
        assert_eq!(battle.winner_id, None);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.reason, PoolUpdateReason::Cancelled);
    }

    #[tokio::test]
    async fn test_cannot_cancel_settled_battle() {
        let arena = Arena::new(MarketKind::TwoSided, BettingMode::Amm, 2).await;
        let betting = BettingManager::new(arena.store.clone(), EnginePolicy::default(), EventPublisher::new(4));
        betting
            .settle_battle(arena.battle_id, arena.characters[0])
            .await
            .unwrap();

        let err = lifecycle(&arena).cancel_battle(arena.battle_id).await.unwrap_err();
        assert!(matches!(err, BettingError::InvalidState(_)));
    }
}
