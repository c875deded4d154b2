use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::exchange::{BitcoinchartsConfig, BtceConfig, HttpConfig};
use crate::service::{
    PollerConfig, QueryWindow, ServiceError, TickErrorPolicy, TradeHistoryConfig,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerSettings {
    pub interval_secs: u64,
    pub buffer: usize,
    pub on_error: TickErrorPolicy,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            buffer: 1,
            on_error: TickErrorPolicy::Skip,
        }
    }
}

impl PollerSettings {
    pub fn to_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_secs(self.interval_secs),
            buffer: self.buffer,
            on_error: self.on_error,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradeHistorySettings {
    pub interval_secs: u64,
    pub initial_lookback_secs: u64,
    pub initial_limit: usize,
    pub steady_lookback_secs: u64,
    pub steady_limit: usize,
    pub retention_secs: u64,
    pub buffer: usize,
    pub on_error: TickErrorPolicy,
}

impl Default for TradeHistorySettings {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            initial_lookback_secs: 3 * 24 * 60 * 60,
            initial_limit: 2000,
            steady_lookback_secs: 15 * 60,
            steady_limit: 100,
            retention_secs: 60 * 60 * 60,
            buffer: 64,
            on_error: TickErrorPolicy::Skip,
        }
    }
}

impl TradeHistorySettings {
    pub fn to_config(&self) -> Result<TradeHistoryConfig, ServiceError> {
        Ok(TradeHistoryConfig {
            interval: Duration::from_secs(self.interval_secs),
            initial: QueryWindow {
                lookback: seconds("initial_lookback_secs", self.initial_lookback_secs)?,
                limit: self.initial_limit,
            },
            steady: QueryWindow {
                lookback: seconds("steady_lookback_secs", self.steady_lookback_secs)?,
                limit: self.steady_limit,
            },
            retention: seconds("retention_secs", self.retention_secs)?,
            buffer: self.buffer,
            on_error: self.on_error,
        })
    }
}

fn seconds(field: &str, secs: u64) -> Result<chrono::Duration, ServiceError> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| ServiceError::Config(format!("trade_history.{} out of range: {}", field, secs)))
}

/// Per-driver connection settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub btce: BtceConfig,
    pub bitcoincharts: BitcoinchartsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub poller: PollerSettings,
    pub trade_history: TradeHistorySettings,
    pub http: HttpConfig,
    pub exchanges: ExchangeSettings,
}

impl Settings {
    /// Load `config/{RUN_MODE}` (if present) plus environment overrides
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        Self::load(&format!("config/{}", run_mode))
    }

    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("MARKET_FEED")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(key) = std::env::var("BTCE_KEY") {
            builder = builder.set_override("exchanges.btce.key", key)?;
        }
        if let Ok(secret) = std::env::var("BTCE_SECRET") {
            builder = builder.set_override("exchanges.btce.secret", secret)?;
        }
        if let Ok(dir) = std::env::var("BTCCHARTS_CACHE") {
            builder = builder.set_override("exchanges.bitcoincharts.cache_dir", dir)?;
        }

        let s = builder.build()?;
        s.try_deserialize()
    }
}
