//! Parimutuel manager

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::EnginePolicy;
use crate::events::{quote_book, EventPublisher, PoolQuote, PoolUpdateReason};
use crate::metrics::{BATTLES_SETTLED, BETS_PLACED, BETS_REJECTED, REFUNDS};
use crate::models::{BattleStatus, Bet, BetStatus, BettingMode};
use crate::money;
use crate::services::book::MarketBook;
use crate::services::error::BettingError;
use crate::services::guards::{self, BetRequest};
use crate::services::payout::{self, Credits, SettlementSummary};
use crate::store::{BettingStore, StoreTx};

/// Places and settles bets on parimutuel battles
pub struct ParimutuelManager {
    store: Arc<dyn BettingStore>,
    policy: EnginePolicy,
    events: EventPublisher,
}

impl ParimutuelManager {
    pub fn new(store: Arc<dyn BettingStore>, policy: EnginePolicy, events: EventPublisher) -> Self {
        Self {
            store,
            policy,
            events,
        }
    }

    /// Indicative odds for every participant of a parimutuel battle.
    ///
    /// The final payout depends on the pools at settlement, not on this quote.
    pub async fn compute_odds(&self, battle_id: Uuid) -> Result<Vec<PoolQuote>, BettingError> {
        let book = guards::load_book(self.store.as_ref(), battle_id, BettingMode::Parimutuel).await?;
        Ok(quote_book(&book, &self.policy.odds))
    }

    /// Place a bet. The gross `amount` is debited; `amount * (1 - house_rate)`
    /// goes into the character's pool.
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
            Ok((bet, book, promoted)) => {
                info!(
                    "Bet {} placed (parimutuel): user={}, battle={}, character={}, amount={}, net={}, status={}",
                    bet.id, user_id, battle_id, character_id, amount, bet.pool_contribution, bet.status
                );
                if promoted > 0 {
                    info!("Battle {}: {} held bets now matched", battle_id, promoted);
                }
                metrics::counter!(BETS_PLACED, "mode" => "parimutuel", "status" => bet.status.as_str())
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

    async fn try_place_bet(
        &self,
        request: &BetRequest,
    ) -> Result<(Bet, MarketBook, usize), BettingError> {
        let mut tx = self.store.begin().await?;
        let mut ctx = guards::load_bet_context(
            tx.as_mut(),
            request,
            BettingMode::Parimutuel,
            self.policy.lock_window,
            Utc::now(),
        )
        .await?;

        let matched = ctx.book.opposing_volume(request.character_id) > Decimal::ZERO;
        let status = if matched {
            BetStatus::Active
        } else {
            if request.amount > self.policy.first_bet_cap {
                return Err(BettingError::BetCapExceeded {
                    amount: request.amount,
                    cap: self.policy.first_bet_cap,
                });
            }
            BetStatus::PendingLiquidity
        };

        let net = money::net_of_fee(request.amount, self.policy.fees.house_rate());
        let bet = Bet::new(
            ctx.account.id,
            request.battle_id,
            request.character_id,
            request.amount,
            net,
            None,
            status,
        );

        tx.adjust_balance(ctx.account.id, -request.amount).await?;
        tx.insert_bet(&bet).await?;
        tx.increment_pool(request.battle_id, request.character_id, net)
            .await?;
        ctx.book.apply(request.character_id, net);

        let promoted = if matched {
            promote_held_bets(tx.as_mut(), &ctx.book, request.battle_id).await?
        } else {
            0
        };

        tx.commit().await?;
        Ok((bet, ctx.book, promoted))
    }

    /// Settle a parimutuel battle in favour of `winner_id`.
    ///
    /// In one transaction: held bets are refunded their stake minus the
    /// immediate fee and their net contribution leaves the pool; matched
    /// winners split the losing net pool pro rata to their net stake; losers
    /// are marked Lost; the battle becomes Finished. A battle that is no
    /// longer open is rejected with `InvalidState`.
    pub async fn settle_battle(
        &self,
        battle_id: Uuid,
        winner_id: Uuid,
    ) -> Result<SettlementSummary, BettingError> {
        match self.try_settle(battle_id, winner_id).await {
            Ok((summary, book)) => {
                info!(
                    "Battle {} settled (parimutuel): winner={}, won={}, lost={}, refunded={}, paid={}, refund_total={}",
                    battle_id,
                    winner_id,
                    summary.bets_won,
                    summary.bets_lost,
                    summary.bets_refunded,
                    summary.total_paid,
                    summary.total_refunded
                );
                metrics::counter!(BATTLES_SETTLED, "mode" => "parimutuel").increment(1);
                if summary.bets_refunded > 0 {
                    metrics::counter!(REFUNDS, "reason" => "unmatched")
                        .increment(summary.bets_refunded as u64);
                }
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
        let snapshot =
            guards::lock_open_battle(tx.as_mut(), battle_id, Some(BettingMode::Parimutuel)).await?;

        if !snapshot.has_participant(winner_id) {
            return Err(BettingError::InvalidParticipant {
                battle_id,
                character_id: winner_id,
            });
        }
        let mut book = MarketBook::from_snapshot(&snapshot)?;

        let mut summary = SettlementSummary::new(battle_id, Some(winner_id));
        let mut credits = Credits::default();
        let bets = tx.battle_bets(battle_id).await?;

        // Unmatched bets: refund minus the immediate fee, reverse the pool
        for bet in bets.iter().filter(|b| b.status == BetStatus::PendingLiquidity) {
            let refund = bet.amount - money::mul(bet.amount, self.policy.fees.immediate_rate);
            tx.increment_pool(battle_id, bet.character_id, -bet.pool_contribution)
                .await?;
            book.apply(bet.character_id, -bet.pool_contribution);
            tx.update_bet_status(
                bet.id,
                BetStatus::PendingLiquidity,
                BetStatus::Cancelled,
                Some(refund),
            )
            .await?;
            credits.add(bet.user_id, refund);
            summary.bets_refunded += 1;
            summary.total_refunded += refund;
        }

        let (winners, losers): (Vec<&Bet>, Vec<&Bet>) = bets
            .iter()
            .filter(|b| b.status == BetStatus::Active)
            .partition(|b| b.character_id == winner_id);

        let winning_total: Decimal = winners.iter().map(|b| b.pool_contribution).sum();
        let losing_total: Decimal = losers.iter().map(|b| b.pool_contribution).sum();

        if winners.is_empty() && !losers.is_empty() {
            warn!(
                "Battle {}: no matched bets on winner {}, losing pool of {} is retained",
                battle_id, winner_id, losing_total
            );
        }

        let stakes: Vec<Decimal> = winners.iter().map(|b| b.pool_contribution).collect();
        let shares = payout::split_losing_pool(&stakes, losing_total).ok_or_else(|| {
            BettingError::InvalidState(format!(
                "battle {}: cannot split losing pool {} over winning pool {}",
                battle_id, losing_total, winning_total
            ))
        })?;

        for (bet, share) in winners.into_iter().zip(shares) {
            let payout = bet.pool_contribution + share;
            tx.update_bet_status(bet.id, BetStatus::Active, BetStatus::Won, Some(payout))
                .await?;
            credits.add(bet.user_id, payout);
            summary.bets_won += 1;
            summary.total_paid += payout;
        }

        for bet in losers {
            tx.update_bet_status(bet.id, BetStatus::Active, BetStatus::Lost, None)
                .await?;
            summary.bets_lost += 1;
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

/// Move every held bet whose opposing side now has money to Active.
/// Returns the number of bets promoted.
async fn promote_held_bets(
    tx: &mut dyn StoreTx,
    book: &MarketBook,
    battle_id: Uuid,
) -> Result<usize, BettingError> {
    let mut promoted = 0;
    for bet in tx.battle_bets(battle_id).await? {
        if bet.status == BetStatus::PendingLiquidity
            && book.opposing_volume(bet.character_id) > Decimal::ZERO
        {
            tx.update_bet_status(bet.id, BetStatus::PendingLiquidity, BetStatus::Active, None)
                .await?;
            promoted += 1;
        }
    }
    Ok(promoted)
}
