//! Postgres store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{BettingStore, StoreError, StoreTx};
use crate::models::{Battle, BattleSnapshot, BattleStatus, Bet, BetStatus, BettingPool, Character, User};

const SELECT_BATTLE: &str = r#"
    SELECT id, title, kind, mode, start_time, status, winner_id, created_at, settled_at
    FROM battles
    WHERE id = $1
"#;

const SELECT_PARTICIPANTS: &str = r#"
    SELECT c.id, c.name, c.owner_id
    FROM battle_participants bp
    JOIN characters c ON c.id = bp.character_id
    WHERE bp.battle_id = $1
    ORDER BY bp.position
"#;

const SELECT_POOLS: &str = r#"
    SELECT battle_id, character_id, volume, updated_at
    FROM betting_pools
    WHERE battle_id = $1
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BettingStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn battle_snapshot(&self, battle_id: Uuid) -> Result<Option<BattleSnapshot>, StoreError> {
        let battle: Option<Battle> = sqlx::query_as(SELECT_BATTLE)
            .bind(battle_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(battle) = battle else {
            return Ok(None);
        };

        let participants: Vec<Character> = sqlx::query_as(SELECT_PARTICIPANTS)
            .bind(battle_id)
            .fetch_all(&self.pool)
            .await?;

        let pools: Vec<BettingPool> = sqlx::query_as(SELECT_POOLS)
            .bind(battle_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(Some(BattleSnapshot {
            battle,
            participants,
            pools,
        }))
    }

    async fn overdue_battles(&self, started_before: DateTime<Utc>) -> Result<Vec<Battle>, StoreError> {
        let battles = sqlx::query_as::<_, Battle>(
            r#"
            SELECT id, title, kind, mode, start_time, status, winner_id, created_at, settled_at
            FROM battles
            WHERE status IN ('pending', 'active') AND start_time < $1
            ORDER BY start_time
            "#,
        )
        .bind(started_before)
        .fetch_all(&self.pool)
        .await?;

        Ok(battles)
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_battle(&mut self, battle_id: Uuid) -> Result<Option<BattleSnapshot>, StoreError> {
        let battle: Option<Battle> = sqlx::query_as(&format!("{} FOR UPDATE", SELECT_BATTLE))
            .bind(battle_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        let Some(battle) = battle else {
            return Ok(None);
        };

        let participants: Vec<Character> = sqlx::query_as(SELECT_PARTICIPANTS)
            .bind(battle_id)
            .fetch_all(&mut *self.tx)
            .await?;

        let pools: Vec<BettingPool> = sqlx::query_as(&format!("{} FOR UPDATE", SELECT_POOLS))
            .bind(battle_id)
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(Some(BattleSnapshot {
            battle,
            participants,
            pools,
        }))
    }

    async fn lock_account(&mut self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, wallet_address, balance, created_at, updated_at
            FROM users
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn adjust_balance(&mut self, user_id: Uuid, delta: Decimal) -> Result<Decimal, StoreError> {
        let balance: Option<Decimal> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET balance = balance + $1, updated_at = NOW()
            WHERE id = $2 AND balance + $1 >= 0
            RETURNING balance
            "#,
        )
        .bind(delta)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        balance.ok_or_else(|| {
            StoreError::Conflict(format!("balance of user {} cannot absorb {}", user_id, delta))
        })
    }

    async fn insert_bet(&mut self, bet: &Bet) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bets (
                id, user_id, battle_id, character_id, amount, pool_contribution,
                odds, status, payout, created_at, settled_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(bet.id)
        .bind(bet.user_id)
        .bind(bet.battle_id)
        .bind(bet.character_id)
        .bind(bet.amount)
        .bind(bet.pool_contribution)
        .bind(bet.odds)
        .bind(bet.status)
        .bind(bet.payout)
        .bind(bet.created_at)
        .bind(bet.settled_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn increment_pool(
        &mut self,
        battle_id: Uuid,
        character_id: Uuid,
        delta: Decimal,
    ) -> Result<Decimal, StoreError> {
        let volume: Decimal = sqlx::query_scalar(
            r#"
            INSERT INTO betting_pools (battle_id, character_id, volume, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (battle_id, character_id)
            DO UPDATE SET volume = betting_pools.volume + EXCLUDED.volume, updated_at = NOW()
            RETURNING volume
            "#,
        )
        .bind(battle_id)
        .bind(character_id)
        .bind(delta)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(volume)
    }

    async fn battle_bets(&mut self, battle_id: Uuid) -> Result<Vec<Bet>, StoreError> {
        let bets = sqlx::query_as::<_, Bet>(
            r#"
            SELECT id, user_id, battle_id, character_id, amount, pool_contribution,
                   odds, status, payout, created_at, settled_at
            FROM bets
            WHERE battle_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(battle_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(bets)
    }

    async fn update_bet_status(
        &mut self,
        bet_id: Uuid,
        from: BetStatus,
        to: BetStatus,
        payout: Option<Decimal>,
    ) -> Result<(), StoreError> {
        if !from.can_transition_to(to) {
            return Err(StoreError::Conflict(format!(
                "bet {} cannot move from {} to {}",
                bet_id, from, to
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE bets
            SET status = $1,
                payout = COALESCE($2, payout),
                settled_at = CASE WHEN $1 IN ('won', 'lost', 'cancelled') THEN NOW() ELSE settled_at END
            WHERE id = $3 AND status = $4
            "#,
        )
        .bind(to)
        .bind(payout)
        .bind(bet_id)
        .bind(from)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("bet {} is no longer {}", bet_id, from)));
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
        let result = sqlx::query(
            r#"
            UPDATE battles
            SET status = $1,
                winner_id = COALESCE($2, winner_id),
                settled_at = CASE WHEN $1 IN ('finished', 'cancelled') THEN NOW() ELSE settled_at END
            WHERE id = $3 AND status = $4
            "#,
        )
        .bind(to)
        .bind(winner_id)
        .bind(battle_id)
        .bind(from)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("battle {} is no longer {}", battle_id, from)));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
