use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Betting account. `wallet_address` is the unique external wallet handle.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub wallet_address: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(wallet_address: impl Into<String>, balance: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            wallet_address: wallet_address.into().to_lowercase(),
            balance,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_afford(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }
}
