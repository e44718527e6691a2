//! Overdue-settlement monitor
//!
//! Settlement is an operator action. This task makes sure a battle that was
//! never settled does not go unnoticed: every sweep lists open battles whose
//! start time is further in the past than the grace period, logs each one and
//! publishes the count as a gauge.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::metrics::OVERDUE_BATTLES;
use crate::models::Battle;
use crate::store::{BettingStore, StoreError};

pub struct SettlementMonitor {
    store: Arc<dyn BettingStore>,
    interval: Duration,
    grace: chrono::Duration,
}

impl SettlementMonitor {
    pub fn new(store: Arc<dyn BettingStore>, interval: Duration, grace: chrono::Duration) -> Self {
        Self {
            store,
            interval,
            grace,
        }
    }

    /// Run one sweep and return the overdue battles
    pub async fn sweep(&self) -> Result<Vec<Battle>, StoreError> {
        let cutoff = Utc::now() - self.grace;
        let overdue = self.store.overdue_battles(cutoff).await?;

        for battle in &overdue {
            warn!(
                "Battle {} ({}) is still {} since {}; settle or cancel it",
                battle.id, battle.title, battle.status, battle.start_time
            );
        }
        metrics::gauge!(OVERDUE_BATTLES).set(overdue.len() as f64);

        Ok(overdue)
    }

    /// Sweep every `interval` until the task is aborted
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Settlement monitor started: interval={:?}, grace={}s",
                self.interval,
                self.grace.num_seconds()
            );
            let mut ticker = tokio::time::interval(self.interval);

            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep().await {
                    error!("Overdue settlement sweep failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BattleStatus, BettingMode, Character, MarketKind};
    use crate::store::MemoryStore;
    use uuid::Uuid;

    async fn battle(store: &MemoryStore, started_hours_ago: i64, status: BattleStatus) -> Uuid {
        let mut battle = Battle::new(
            "Overdue check",
            MarketKind::TwoSided,
            BettingMode::Amm,
            Utc::now() - chrono::Duration::hours(started_hours_ago),
        );
        battle.status = status;
        let id = battle.id;
        let owner = Uuid::new_v4();
        store
            .add_battle(battle, vec![Character::new("a", owner), Character::new("b", owner)])
            .await;
        id
    }

    #[tokio::test]
    async fn test_sweep_finds_open_battles_past_grace() {
        let store = Arc::new(MemoryStore::new());
        let overdue = battle(&store, 10, BattleStatus::Active).await;
        let _recent = battle(&store, 1, BattleStatus::Active).await;
        let _settled = battle(&store, 10, BattleStatus::Finished).await;
        let _cancelled = battle(&store, 12, BattleStatus::Cancelled).await;

        let monitor = SettlementMonitor::new(store, Duration::from_secs(60), chrono::Duration::hours(6));
        let found = monitor.sweep().await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, overdue);
    }

    #[tokio::test]
    async fn test_spawned_monitor_can_be_aborted() {
        let store = Arc::new(MemoryStore::new());
        battle(&store, 10, BattleStatus::Pending).await;

        let handle = SettlementMonitor::new(store, Duration::from_millis(10), chrono::Duration::hours(6)).spawn();
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
