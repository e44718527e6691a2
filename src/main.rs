use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arena_betting::config::AppConfig;
use arena_betting::db::Database;
use arena_betting::events::EventPublisher;
use arena_betting::metrics;
use arena_betting::services::{BettingManager, LifecycleManager, ParimutuelManager, SettlementMonitor};
use arena_betting::store::{BettingStore, PgStore};

/// Managers shared with whatever front end embeds the engine
#[allow(dead_code)]
pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    pub betting: Arc<BettingManager>,
    pub parimutuel: Arc<ParimutuelManager>,
    pub lifecycle: Arc<LifecycleManager>,
    pub events: EventPublisher,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arena_betting=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;
    let policy = config.engine_policy()?;

    tracing::info!("Starting Arena Betting Engine v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.environment);
    tracing::info!(
        "Policy: house_rate={}, immediate_fee={}, odds=[{}, {}/{}], safety_buffer={}, lock_window={}s",
        policy.fees.house_rate(),
        policy.fees.immediate_rate,
        policy.odds.min_odds,
        policy.odds.max_odds_two_sided,
        policy.odds.max_odds_multi,
        policy.liquidity.safety_buffer,
        policy.lock_window.num_seconds()
    );

    // Initialize Prometheus metrics
    metrics::init_metrics(config.metrics_port)?;
    tracing::info!("Prometheus metrics listening on port {}", config.metrics_port);

    // Initialize database
    let db = Database::connect(&config.database_url, &config.pool_settings()).await?;
    db.migrate().await?;
    if !db.health_check().await {
        anyhow::bail!("Database health check failed");
    }

    let store: Arc<dyn BettingStore> = Arc::new(PgStore::new(db.pool().clone()));

    // Pool/odds update channel
    let events = EventPublisher::new(config.event_channel_capacity);
    let mut pool_updates = events.subscribe();
    tokio::spawn(async move {
        loop {
            match pool_updates.recv().await {
                Ok(event) => {
                    tracing::debug!(
                        "Pool update for battle {} ({:?}): {} participants",
                        event.battle_id,
                        event.reason,
                        event.pools.len()
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Pool update listener lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let state = AppState {
        betting: Arc::new(BettingManager::new(store.clone(), policy.clone(), events.clone())),
        parimutuel: Arc::new(ParimutuelManager::new(store.clone(), policy.clone(), events.clone())),
        lifecycle: Arc::new(LifecycleManager::new(store.clone(), policy, events.clone())),
        events,
        config,
        db,
    };
    tracing::info!("Betting managers initialized");

    // Overdue-settlement monitor
    let monitor = SettlementMonitor::new(
        store,
        Duration::from_secs(state.config.monitor_interval_secs),
        state.config.settlement_grace(),
    )
    .spawn();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    monitor.abort();
    state.db.pool().close().await;
    tracing::info!("Arena Betting Engine stopped");
    Ok(())
}
