use std::str::FromStr;

use anyhow::{bail, Context};
use chrono::Duration;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::db::PoolSettings;
use crate::services::liquidity::LiquidityParams;
use crate::services::odds::OddsParams;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_environment")]
    pub environment: String,

    pub database_url: String,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    // Betting window
    #[serde(default = "default_lock_window_secs")]
    pub betting_lock_window_secs: i64,

    // Fee split (decimal strings). House rate = platform + incentive.
    #[serde(default = "default_platform_fee_rate")]
    pub platform_fee_rate: String,

    #[serde(default = "default_incentive_fee_rate")]
    pub incentive_fee_rate: String,

    // Part of the house fee kept when an unmatched parimutuel bet is refunded
    #[serde(default = "default_immediate_fee_rate")]
    pub immediate_fee_rate: String,

    // Odds band
    #[serde(default = "default_min_odds")]
    pub min_odds: String,

    #[serde(default = "default_max_odds_two_sided")]
    pub max_odds_two_sided: String,

    #[serde(default = "default_max_odds_multi")]
    pub max_odds_multi: String,

    // Liquidity
    #[serde(default = "default_safety_buffer")]
    pub safety_buffer: String,

    #[serde(default = "default_bootstrap_liquidity")]
    pub bootstrap_liquidity: String,

    #[serde(default = "default_first_bet_cap")]
    pub first_bet_cap: String,

    // Push channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    // Overdue-settlement monitor
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,

    #[serde(default = "default_settlement_grace_secs")]
    pub settlement_grace_secs: i64,
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_db_max_connections() -> u32 {
    32
}

fn default_db_min_connections() -> u32 {
    4
}

fn default_db_acquire_timeout_secs() -> u64 {
    5
}

fn default_metrics_port() -> u16 {
    9100
}

fn default_lock_window_secs() -> i64 {
    120 // 2 minutes
}

fn default_platform_fee_rate() -> String {
    "0.0445".to_string()
}

fn default_incentive_fee_rate() -> String {
    "0.01".to_string()
}

fn default_immediate_fee_rate() -> String {
    "0.02".to_string()
}

fn default_min_odds() -> String {
    "1.05".to_string()
}

fn default_max_odds_two_sided() -> String {
    "20".to_string()
}

fn default_max_odds_multi() -> String {
    "100".to_string()
}

fn default_safety_buffer() -> String {
    "0.9".to_string()
}

fn default_bootstrap_liquidity() -> String {
    "100".to_string()
}

fn default_first_bet_cap() -> String {
    "1000".to_string()
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_monitor_interval_secs() -> u64 {
    60
}

fn default_settlement_grace_secs() -> i64 {
    21600 // 6 hours
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        Ok(app_config)
    }

    /// Parse and validate the pricing/fee policy
    pub fn engine_policy(&self) -> anyhow::Result<EnginePolicy> {
        let fees = FeeSchedule {
            platform_rate: parse_decimal("PLATFORM_FEE_RATE", &self.platform_fee_rate)?,
            incentive_rate: parse_decimal("INCENTIVE_FEE_RATE", &self.incentive_fee_rate)?,
            immediate_rate: parse_decimal("IMMEDIATE_FEE_RATE", &self.immediate_fee_rate)?,
        };
        let safety_buffer = parse_decimal("SAFETY_BUFFER", &self.safety_buffer)?;

        let policy = EnginePolicy {
            odds: OddsParams {
                house_rate: fees.house_rate(),
                min_odds: parse_decimal("MIN_ODDS", &self.min_odds)?,
                max_odds_two_sided: parse_decimal("MAX_ODDS_TWO_SIDED", &self.max_odds_two_sided)?,
                max_odds_multi: parse_decimal("MAX_ODDS_MULTI", &self.max_odds_multi)?,
                safety_buffer,
            },
            liquidity: LiquidityParams {
                safety_buffer,
                bootstrap_liquidity: parse_decimal("BOOTSTRAP_LIQUIDITY", &self.bootstrap_liquidity)?,
            },
            fees,
            first_bet_cap: parse_decimal("FIRST_BET_CAP", &self.first_bet_cap)?,
            lock_window: Duration::seconds(self.betting_lock_window_secs),
        };

        policy.validate()?;
        Ok(policy)
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.db_max_connections,
            min_connections: self.db_min_connections,
            acquire_timeout: std::time::Duration::from_secs(self.db_acquire_timeout_secs),
        }
    }

    pub fn settlement_grace(&self) -> Duration {
        Duration::seconds(self.settlement_grace_secs)
    }
}

fn parse_decimal(name: &str, value: &str) -> anyhow::Result<Decimal> {
    Decimal::from_str(value.trim()).with_context(|| format!("{} is not a decimal: {:?}", name, value))
}

/// Fee split
#[derive(Debug, Clone, PartialEq)]
pub struct FeeSchedule {
    pub platform_rate: Decimal,
    pub incentive_rate: Decimal,
    /// Non-refundable part of the fee on a cancelled unmatched bet
    pub immediate_rate: Decimal,
}

impl FeeSchedule {
    /// Total fee taken off every parimutuel stake
    pub fn house_rate(&self) -> Decimal {
        self.platform_rate + self.incentive_rate
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            platform_rate: Decimal::new(445, 4),
            incentive_rate: Decimal::new(1, 2),
            immediate_rate: Decimal::new(2, 2),
        }
    }
}

/// Everything the managers need to price, validate and settle bets
#[derive(Debug, Clone)]
pub struct EnginePolicy {
    pub odds: OddsParams,
    pub liquidity: LiquidityParams,
    pub fees: FeeSchedule,
    /// Ceiling for a parimutuel bet on a side with no opposing money
    pub first_bet_cap: Decimal,
    /// Betting closes this long before a battle starts
    pub lock_window: Duration,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        let fees = FeeSchedule::default();
        Self {
            odds: OddsParams {
                house_rate: fees.house_rate(),
                ..OddsParams::default()
            },
            liquidity: LiquidityParams::default(),
            fees,
            first_bet_cap: Decimal::from(1000),
            lock_window: Duration::minutes(2),
        }
    }
}

impl EnginePolicy {
    pub fn validate(&self) -> anyhow::Result<()> {
        let rate_ok = |r: Decimal| r >= Decimal::ZERO && r < Decimal::ONE;

        if !rate_ok(self.fees.platform_rate) || !rate_ok(self.fees.incentive_rate) {
            bail!("fee rates must be in [0, 1)");
        }
        if !rate_ok(self.fees.house_rate()) {
            bail!("house rate {} must be below 1", self.fees.house_rate());
        }
        if self.fees.immediate_rate < Decimal::ZERO || self.fees.immediate_rate > self.fees.house_rate() {
            bail!(
                "immediate fee rate {} must be within [0, {}]",
                self.fees.immediate_rate,
                self.fees.house_rate()
            );
        }
        if self.odds.house_rate != self.fees.house_rate() {
            bail!("odds house rate does not match the fee schedule");
        }
        if self.odds.min_odds < Decimal::ONE {
            bail!("min odds must be at least 1");
        }
        if self.odds.min_odds > self.odds.max_odds_two_sided || self.odds.min_odds > self.odds.max_odds_multi {
            bail!("min odds exceed a max odds bound");
        }
        let buffer = self.liquidity.safety_buffer;
        if buffer <= Decimal::ZERO || buffer > Decimal::ONE || buffer != self.odds.safety_buffer {
            bail!("safety buffer must be in (0, 1] and shared by odds and liquidity");
        }
        if self.liquidity.bootstrap_liquidity <= Decimal::ZERO || self.first_bet_cap <= Decimal::ZERO {
            bail!("bootstrap liquidity and first bet cap must be positive");
        }
        if self.lock_window < Duration::zero() {
            bail!("lock window cannot be negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> AppConfig {
        AppConfig {
            environment: default_environment(),
            database_url: "postgres://localhost/arena".to_string(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            metrics_port: default_metrics_port(),
            betting_lock_window_secs: default_lock_window_secs(),
            platform_fee_rate: default_platform_fee_rate(),
            incentive_fee_rate: default_incentive_fee_rate(),
            immediate_fee_rate: default_immediate_fee_rate(),
            min_odds: default_min_odds(),
            max_odds_two_sided: default_max_odds_two_sided(),
            max_odds_multi: default_max_odds_multi(),
            safety_buffer: default_safety_buffer(),
            bootstrap_liquidity: default_bootstrap_liquidity(),
            first_bet_cap: default_first_bet_cap(),
            event_channel_capacity: default_event_channel_capacity(),
            monitor_interval_secs: default_monitor_interval_secs(),
            settlement_grace_secs: default_settlement_grace_secs(),
        }
    }

    #[test]
    fn test_default_policy_matches_reference_values() {
        let policy = config().engine_policy().unwrap();
        assert_eq!(policy.fees.house_rate(), dec!(0.0545));
        assert_eq!(policy.odds.house_rate, dec!(0.0545));
        assert_eq!(policy.odds.min_odds, dec!(1.05));
        assert_eq!(policy.odds.max_odds_two_sided, dec!(20));
        assert_eq!(policy.odds.max_odds_multi, dec!(100));
        assert_eq!(policy.liquidity.safety_buffer, dec!(0.9));
        assert_eq!(policy.liquidity.bootstrap_liquidity, dec!(100));
        assert_eq!(policy.first_bet_cap, dec!(1000));
        assert_eq!(policy.lock_window, Duration::minutes(2));
    }

    #[test]
    fn test_engine_policy_default_is_valid() {
        let policy = EnginePolicy::default();
        policy.validate().unwrap();
        assert_eq!(policy.odds.house_rate, dec!(0.0545));
    }

    #[test]
    fn test_rejects_bad_decimal() {
        let mut cfg = config();
        cfg.safety_buffer = "ninety percent".to_string();
        assert!(cfg.engine_policy().is_err());
    }

    #[test]
    fn test_rejects_immediate_fee_above_house_rate() {
        let mut cfg = config();
        cfg.immediate_fee_rate = "0.06".to_string();
        assert!(cfg.engine_policy().is_err());
    }

    #[test]
    fn test_rejects_inverted_odds_band() {
        let mut cfg = config();
        cfg.min_odds = "25".to_string();
        assert!(cfg.engine_policy().is_err());
    }

    #[test]
    fn test_pool_settings_defaults() {
        let settings = config().pool_settings();
        assert_eq!(settings.max_connections, 32);
        assert_eq!(settings.min_connections, 4);
        assert_eq!(settings.acquire_timeout, std::time::Duration::from_secs(5));
        settings.validate().unwrap();
    }
}
