//! Application configuration.

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};
use perpgate_core::Symbol;
use perpgate_feed::{AggregatorConfig, TradeRefreshConfig, DEFAULT_TRADE_CAPACITY};
use perpgate_gateway::{ClientConfig, Credentials, MAINNET_BASE_URL, TESTNET_BASE_URL};
use perpgate_position::PollerConfig;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Env var overriding the active environment's API key.
pub const API_KEY_ENV: &str = "PERPGATE_API_KEY";
/// Env var overriding the active environment's secret key.
pub const SECRET_KEY_ENV: &str = "PERPGATE_SECRET_KEY";

// ============================================================================
// Exchange
// ============================================================================

/// Which exchange environment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Testnet,
    Production,
}

/// Credentials and endpoint of one environment.
#[derive(Clone, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub secret_key: String,
    pub base_url: String,
}

impl EnvironmentConfig {
    fn testnet() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            base_url: TESTNET_BASE_URL.to_string(),
        }
    }

    fn production() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            base_url: MAINNET_BASE_URL.to_string(),
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.api_key.clone(), self.secret_key.clone())
    }
}

impl fmt::Debug for EnvironmentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentConfig")
            .field("credentials", &self.credentials())
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn default_testnet() -> EnvironmentConfig {
    EnvironmentConfig::testnet()
}

fn default_production() -> EnvironmentConfig {
    EnvironmentConfig::production()
}

/// Exchange environments.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default = "default_testnet")]
    pub testnet: EnvironmentConfig,
    #[serde(default = "default_production")]
    pub production: EnvironmentConfig,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            testnet: default_testnet(),
            production: default_production(),
        }
    }
}

impl ExchangeConfig {
    /// The selected environment.
    pub fn active(&self) -> &EnvironmentConfig {
        match self.environment {
            Environment::Testnet => &self.testnet,
            Environment::Production => &self.production,
        }
    }

    fn active_mut(&mut self) -> &mut EnvironmentConfig {
        match self.environment {
            Environment::Testnet => &mut self.testnet,
            Environment::Production => &mut self.production,
        }
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// Snapshot scheduling.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Minutes between snapshots. Default: 15.
    #[serde(default = "default_snapshot_interval_mins")]
    pub snapshot_interval_mins: u64,
}

/// One week.
const MAX_SNAPSHOT_INTERVAL_MINS: u64 = 7 * 24 * 60;

fn default_snapshot_interval_mins() -> u64 {
    15
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_mins: default_snapshot_interval_mins(),
        }
    }
}

impl ScheduleConfig {
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_mins.saturating_mul(60))
    }
}

/// Trade cache sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeCacheConfig {
    /// Maximum trades retained. Default: 10,000.
    #[serde(default = "default_trade_capacity")]
    pub capacity: usize,
}

fn default_trade_capacity() -> usize {
    DEFAULT_TRADE_CAPACITY
}

impl Default for TradeCacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_trade_capacity(),
        }
    }
}

// ============================================================================
// Trading hours
// ============================================================================

/// Local-time window in which the process runs without an open position.
///
/// Day hours apply Monday to Friday, night hours Tuesday to Saturday (the
/// tail of the previous trading day).
#[derive(Debug, Clone, Deserialize)]
pub struct TradingHoursConfig {
    /// When false the gate is always open.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Local offset from UTC in hours. Default: +8.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    #[serde(default = "default_day_hours")]
    pub day_hours: Vec<u32>,
    #[serde(default = "default_night_hours")]
    pub night_hours: Vec<u32>,
}

fn default_true() -> bool {
    true
}

fn default_utc_offset_hours() -> i32 {
    8
}

fn default_day_hours() -> Vec<u32> {
    vec![9, 10, 11, 12, 18, 19, 20, 21, 22, 23]
}

fn default_night_hours() -> Vec<u32> {
    vec![0, 1, 2, 3]
}

impl Default for TradingHoursConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            utc_offset_hours: default_utc_offset_hours(),
            day_hours: default_day_hours(),
            night_hours: default_night_hours(),
        }
    }
}

impl TradingHoursConfig {
    fn offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours.checked_mul(3600)?)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.offset().is_none() {
            return Err(AppError::Config(format!(
                "trading_hours.utc_offset_hours out of range: {}",
                self.utc_offset_hours
            )));
        }
        if let Some(hour) = self
            .day_hours
            .iter()
            .chain(&self.night_hours)
            .find(|h| **h > 23)
        {
            return Err(AppError::Config(format!("trading_hours: invalid hour {hour}")));
        }
        Ok(())
    }

    /// Whether `now` falls inside the window.
    pub fn is_trading_time(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return true;
        }
        let Some(offset) = self.offset() else {
            return false;
        };

        let local = now.with_timezone(&offset);
        let hour = local.hour();
        let weekday = local.weekday().num_days_from_monday();

        let day = weekday <= 4 && self.day_hours.contains(&hour);
        let night = (1..=5).contains(&weekday) && self.night_hours.contains(&hour);
        day || night
    }
}

// ============================================================================
// Telemetry
// ============================================================================

/// Telemetry configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter directive used when `RUST_LOG` is unset.
    #[serde(default)]
    pub log_filter: Option<String>,
}

// ============================================================================
// Application
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Contract every component works on. Overrides per-section symbols.
    #[serde(default)]
    pub symbol: Symbol,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Client settings. `base_url` is taken from the active environment.
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub trade_cache: TradeCacheConfig,
    #[serde(default)]
    pub trade_refresh: TradeRefreshConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub trading_hours: TradingHoursConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load from a TOML file, then apply credential env overrides.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;

        let mut config = Self::from_toml(&content)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse and validate TOML without consulting the environment.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the active environment's keys with non-empty values from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = self.exchange.active_mut();
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.is_empty()) {
            env.api_key = key;
        }
        if let Some(secret) = lookup(SECRET_KEY_ENV).filter(|v| !v.is_empty()) {
            env.secret_key = secret;
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.schedule.snapshot_interval_mins == 0 {
            return Err(AppError::Config(
                "schedule.snapshot_interval_mins must be positive".to_string(),
            ));
        }
        if self.schedule.snapshot_interval_mins > MAX_SNAPSHOT_INTERVAL_MINS {
            return Err(AppError::Config(format!(
                "schedule.snapshot_interval_mins must be at most {MAX_SNAPSHOT_INTERVAL_MINS}"
            )));
        }
        if self.poller.interval_secs == 0 {
            return Err(AppError::Config("poller.interval_secs must be positive".to_string()));
        }
        if self.trade_refresh.interval_secs == 0 {
            return Err(AppError::Config(
                "trade_refresh.interval_secs must be positive".to_string(),
            ));
        }
        self.trading_hours.validate()
    }

    pub fn credentials(&self) -> Credentials {
        self.exchange.active().credentials()
    }

    /// Client settings pointed at the active environment.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.exchange.active().base_url.clone(),
            ..self.client.clone()
        }
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            symbol: self.symbol.clone(),
            ..self.aggregator.clone()
        }
    }

    pub fn trade_refresh_config(&self) -> TradeRefreshConfig {
        TradeRefreshConfig {
            symbol: self.symbol.clone(),
            ..self.trade_refresh.clone()
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            symbol: self.symbol.clone(),
            ..self.poller.clone()
        }
    }
}
