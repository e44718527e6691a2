//! Pool/odds update events
//!
//! Managers publish one event after every committed change to a battle's
//! pools. Transport to clients is somebody else's job: anything that wants the
//! updates subscribes to the broadcast channel.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::services::book::MarketBook;
use crate::services::odds::OddsParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolUpdateReason {
    BetPlaced,
    Settled,
    Cancelled,
}

/// One participant's pool and current quote
#[derive(Debug, Clone, Serialize)]
pub struct PoolQuote {
    pub character_id: Uuid,
    pub volume: Decimal,
    pub odds: Decimal,
}

/// Pool/odds snapshot pushed to subscribers
#[derive(Debug, Clone, Serialize)]
pub struct PoolUpdateEvent {
    pub battle_id: Uuid,
    pub reason: PoolUpdateReason,
    pub pools: Vec<PoolQuote>,
    pub timestamp: i64,
}

/// Per-participant volume and odds of `book`, in participant order
pub fn quote_book(book: &MarketBook, params: &OddsParams) -> Vec<PoolQuote> {
    book.odds(params)
        .into_iter()
        .zip(book.volumes())
        .map(|((character_id, odds), (_, volume))| PoolQuote {
            character_id,
            volume,
            odds,
        })
        .collect()
}

#[derive(Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PoolUpdateEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolUpdateEvent> {
        self.sender.subscribe()
    }

    /// Publish the state of `book`. Having no subscribers is not an error.
    pub fn publish(
        &self,
        battle_id: Uuid,
        reason: PoolUpdateReason,
        book: &MarketBook,
        params: &OddsParams,
    ) {
        let event = PoolUpdateEvent {
            battle_id,
            reason,
            pools: quote_book(book, params),
            timestamp: Utc::now().timestamp_millis(),
        };
        let _ = self.sender.send(event);
    }
}
