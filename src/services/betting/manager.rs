//! AMM betting manager

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EnginePolicy;
use crate::events::{quote_book, EventPublisher, PoolQuote, PoolUpdateReason};
use crate::metrics::{BATTLES_SETTLED, BETS_PLACED, BETS_REJECTED};
use crate::models::{BattleStatus, Bet, BetStatus, BettingMode};
use crate::money;
use crate::services::book::MarketBook;
use crate::services::error::BettingError;
use crate::services::guards::{self, BetRequest};
use crate::services::liquidity;
use crate::services::payout::{Credits, SettlementSummary};
use crate::store::BettingStore;

/// Places and settles fixed-odds bets on AMM battles
pub struct BettingManager {
    store: Arc<dyn BettingStore>,
    policy: EnginePolicy,
    events: EventPublisher,
}

impl BettingManager {
    pub fn new(store: Arc<dyn BettingStore>, policy: EnginePolicy, events: EventPublisher) -> Self {
        Self {
            store,
            policy,
            events,
        }
    }

    pub fn policy(&self) -> &EnginePolicy {
        &self.policy
    }

    /// Current odds for every participant of an AMM battle
    pub async fn compute_odds(&self, battle_id: Uuid) -> Result<Vec<PoolQuote>, BettingError> {
        let book = guards::load_book(self.store.as_ref(), battle_id, BettingMode::Amm).await?;
        Ok(quote_book(&book, &self.policy.odds))
    }

    /// Place a bet at the current odds.
    ///
    /// The odds and the liquidity decision are taken from the rows locked by
    /// this call's transaction; the bet records the odds it was accepted at.
    pub async fn place_bet(
        &self,
        user_id: Uuid,
        battle_id: Uuid,
        character_id: Uuid,
        amount: Decimal,
    ) -> Result<Bet, BettingError> {
        let request = BetRequest {
            user_id,
            battle_id,
            character_id,
            amount,
        };

        match self.try_place_bet(&request).await {
            Ok((bet, book)) => {
                info!(
                    "Bet {} placed: user={}, battle={}, character={}, amount={}, odds={:?}",
                    bet.id, user_id, battle_id, character_id, amount, bet.odds
                );
                metrics::counter!(BETS_PLACED, "mode" => "amm", "status" => bet.status.as_str())
                    .increment(1);
                self.events
                    .publish(battle_id, PoolUpdateReason::BetPlaced, &book, &self.policy.odds);
                Ok(bet)
            }
            Err(e) => {
                if e.is_rejection() {
                    warn!(
                        "Bet rejected [{}]: user={}, battle={}, amount={}: {}",
                        e.kind().code(),
                        user_id,
                        battle_id,
                        amount,
                        e
                    );
                } else {
                    error!("Bet failed: user={}, battle={}: {}", user_id, battle_id, e);
                }
                metrics::counter!(BETS_REJECTED, "code" => e.kind().code()).increment(1);
                Err(e)
            }
        }
    }

    async fn try_place_bet(&self, request: &BetRequest) -> Result<(Bet, MarketBook), BettingError> {
        let mut tx = self.store.begin().await?;
        let mut ctx = guards::load_bet_context(
            tx.as_mut(),
            request,
            BettingMode::Amm,
            self.policy.lock_window,
            Utc::now(),
        )
        .await?;

        let odds = ctx
            .book
            .odds_for(request.character_id, &self.policy.odds)
            .ok_or(BettingError::InvalidParticipant {
                battle_id: request.battle_id,
                character_id: request.character_id,
            })?;

        let check = liquidity::check_bet(
            &ctx.book,
            request.character_id,
            request.amount,
            odds,
            &self.policy.liquidity,
        )
        .into_result()?;
        debug!(
            "Liquidity ok for battle {}: required={}, available={}, bootstrap={}",
            request.battle_id, check.required, check.available, check.bootstrap
        );

        let bet = Bet::new(
            ctx.account.id,
            request.battle_id,
            request.character_id,
            request.amount,
            request.amount,
            Some(odds),
            BetStatus::Active,
        );

        tx.adjust_balance(ctx.account.id, -request.amount).await?;
        tx.insert_bet(&bet).await?;
        tx.increment_pool(request.battle_id, request.character_id, request.amount)
            .await?;
        tx.commit().await?;

        ctx.book.apply(request.character_id, request.amount);
        Ok((bet, ctx.book))
    }

    /// Settle an AMM battle: winners are paid `amount * odds` (truncated),
    /// losers get nothing, the battle is marked Finished with `winner_id`.
    /// A bet held for liquidity has no place in an AMM battle and fails the
    /// settlement with `InvalidState`.
    ///
    /// A battle that is no longer open is rejected with `InvalidState`, so a
    /// second call never pays twice.
    pub async fn settle_battle(
        &self,
        battle_id: Uuid,
        winner_id: Uuid,
    ) -> Result<SettlementSummary, BettingError> {
        match self.try_settle(battle_id, winner_id).await {
            Ok((summary, book)) => {
                info!(
                    "Battle {} settled (amm): winner={}, won={}, lost={}, paid={}",
                    battle_id,
                    winner_id,
                    summary.bets_won,
                    summary.bets_lost,
                    summary.total_paid
                );
                metrics::counter!(BATTLES_SETTLED, "mode" => "amm").increment(1);
                self.events
                    .publish(battle_id, PoolUpdateReason::Settled, &book, &self.policy.odds);
                Ok(summary)
            }
            Err(e) => {
                error!("Settlement of battle {} failed: {}", battle_id, e);
                Err(e)
            }
        }
    }

    async fn try_settle(
        &self,
        battle_id: Uuid,
        winner_id: Uuid,
    ) -> Result<(SettlementSummary, MarketBook), BettingError> {
        let mut tx = self.store.begin().await?;
        let snapshot = guards::lock_open_battle(tx.as_mut(), battle_id, Some(BettingMode::Amm)).await?;

        if !snapshot.has_participant(winner_id) {
            return Err(BettingError::InvalidParticipant {
                battle_id,
                character_id: winner_id,
            });
        }
        let book = MarketBook::from_snapshot(&snapshot)?;

        let mut summary = SettlementSummary::new(battle_id, Some(winner_id));
        let mut credits = Credits::default();

        for bet in tx.battle_bets(battle_id).await? {
            match bet.status {
                BetStatus::Active if bet.character_id == winner_id => {
                    let odds = bet.odds.ok_or_else(|| {
                        BettingError::InvalidState(format!("bet {} has no recorded odds", bet.id))
                    })?;
                    let payout = money::mul(bet.amount, odds);
                    tx.update_bet_status(bet.id, BetStatus::Active, BetStatus::Won, Some(payout))
                        .await?;
                    credits.add(bet.user_id, payout);
                    summary.bets_won += 1;
                    summary.total_paid += payout;
                }
                BetStatus::Active => {
                    tx.update_bet_status(bet.id, BetStatus::Active, BetStatus::Lost, None)
                        .await?;
                    summary.bets_lost += 1;
                }
                BetStatus::PendingLiquidity => {
                    return Err(BettingError::InvalidState(format!(
                        "bet {} is held for liquidity in AMM battle {}",
                        bet.id, battle_id
                    )));
                }
                BetStatus::Won | BetStatus::Lost | BetStatus::Cancelled => {}
            }
        }

        credits.apply(tx.as_mut()).await?;
        tx.update_battle_status(
            battle_id,
            snapshot.battle.status,
            BattleStatus::Finished,
            Some(winner_id),
        )
        .await?;
        tx.commit().await?;

        Ok((summary, book))
    }
}
