//! Postgres connection pool and schema migrations
//!
//! Each placement or settlement keeps one pooled connection for the length of
//! its transaction, so `max_connections` bounds the number of bets in flight.

use std::str::FromStr;
use std::time::Duration;

use anyhow::bail;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

/// Pool sizing read from `DB_*` settings
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl PoolSettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_connections == 0 {
            bail!("DB_MAX_CONNECTIONS must be at least 1");
        }
        if self.min_connections > self.max_connections {
            bail!(
                "DB_MIN_CONNECTIONS ({}) exceeds DB_MAX_CONNECTIONS ({})",
                self.min_connections,
                self.max_connections
            );
        }
        Ok(())
    }
}

pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(url: &str, settings: &PoolSettings) -> anyhow::Result<Self> {
        settings.validate()?;
        let options = PgConnectOptions::from_str(url)?;

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .test_before_acquire(true)
            .connect_with(options)
            .await?;

        tracing::info!(
            "Database pool ready: max={}, min={}, open={}",
            settings.max_connections,
            settings.min_connections,
            pool.size()
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations from `migrations/`
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}
