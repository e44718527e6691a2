//! Seeded in-memory markets for manager tests

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{Battle, BettingMode, Character, MarketKind, User};
use crate::store::MemoryStore;

pub(crate) struct Arena {
    pub store: Arc<MemoryStore>,
    pub battle_id: Uuid,
    pub characters: Vec<Uuid>,
}

impl Arena {
    /// A battle starting in an hour, with `participants` characters
    pub async fn new(kind: MarketKind, mode: BettingMode, participants: usize) -> Self {
        Self::starting_in(kind, mode, participants, Duration::hours(1)).await
    }

    pub async fn starting_in(
        kind: MarketKind,
        mode: BettingMode,
        participants: usize,
        start_in: Duration,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let battle = Battle::new("Arena test", kind, mode, Utc::now() + start_in);
        let battle_id = battle.id;

        let owner = Uuid::new_v4();
        let roster: Vec<Character> = (0..participants)
            .map(|i| Character::new(format!("fighter-{}", i), owner))
            .collect();
        let characters = roster.iter().map(|c| c.id).collect();
        store.add_battle(battle, roster).await;

        Self {
            store,
            battle_id,
            characters,
        }
    }

    pub async fn user(&self, balance: Decimal) -> Uuid {
        let user = User::new(format!("0x{}", Uuid::new_v4().simple()), balance);
        let id = user.id;
        self.store.add_user(user).await;
        id
    }

    pub async fn balance(&self, user_id: Uuid) -> Decimal {
        self.store
            .user(user_id)
            .await
            .map(|u| u.balance)
            .unwrap_or_default()
    }

    pub async fn pool(&self, index: usize) -> Decimal {
        self.store
            .pool_volume(self.battle_id, self.characters[index])
            .await
    }
}
