// =================================================================
// exchange/registry.rs - Driver Registry
// =================================================================

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{
    bitcoincharts::BitcoinchartsExchange, btce::BtceExchange, http::HttpClient, Exchange,
    ExchangeError,
};
use crate::config::ExchangeSettings;

/// Parsed registry key: `driver` or `driver:variant`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeKey {
    pub driver: String,
    pub variant: Option<String>,
}

impl ExchangeKey {
    pub fn parse(key: &str) -> Result<Self, ExchangeError> {
        let key = key.trim();
        let (driver, variant) = match key.split_once(':') {
            Some((driver, variant)) => (driver, Some(variant)),
            None => (key, None),
        };

        if driver.is_empty() || variant.is_some_and(str::is_empty) {
            return Err(ExchangeError::UnknownExchange(key.to_string()));
        }

        Ok(Self {
            driver: driver.to_ascii_lowercase(),
            variant: variant.map(str::to_string),
        })
    }

    /// Name the built driver reports, e.g. `bitcoincharts:bitstamp`
    pub fn name(&self) -> String {
        match &self.variant {
            Some(variant) => format!("{}:{}", self.driver, variant),
            None => self.driver.clone(),
        }
    }
}

/// Constructor for one driver
pub type ExchangeFactory =
    fn(&ExchangeKey, &ExchangeSettings, &HttpClient) -> Result<Arc<dyn Exchange>, ExchangeError>;

/// Maps driver names to constructors
///
/// Built once at startup and handed to whatever needs to open exchanges.
pub struct ExchangeRegistry {
    factories: HashMap<&'static str, ExchangeFactory>,
    settings: ExchangeSettings,
    http: HttpClient,
}

impl ExchangeRegistry {
    /// Registry with no drivers
    pub fn new(settings: ExchangeSettings, http: HttpClient) -> Self {
        Self {
            factories: HashMap::new(),
            settings,
            http,
        }
    }

    /// Registry with every bundled driver
    pub fn with_default_drivers(settings: ExchangeSettings, http: HttpClient) -> Self {
        let mut registry = Self::new(settings, http);
        registry.register("btce", build_btce);
        registry.register("bitcoincharts", build_bitcoincharts);
        registry
    }

    pub fn register(&mut self, driver: &'static str, factory: ExchangeFactory) {
        self.factories.insert(driver, factory);
    }

    /// Registered driver names, sorted
    pub fn drivers(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Open the exchange named by `key`
    pub fn create(&self, key: &str) -> Result<Arc<dyn Exchange>, ExchangeError> {
        let parsed = ExchangeKey::parse(key)?;
        let factory = self
            .factories
            .get(parsed.driver.as_str())
            .ok_or_else(|| ExchangeError::UnknownExchange(parsed.driver.clone()))?;

        debug!("Creating exchange {}", parsed.name());
        factory(&parsed, &self.settings, &self.http)
    }
}

fn build_btce(
    key: &ExchangeKey,
    settings: &ExchangeSettings,
    http: &HttpClient,
) -> Result<Arc<dyn Exchange>, ExchangeError> {
    Ok(Arc::new(BtceExchange::new(
        &key.name(),
        settings.btce.clone(),
        http.clone(),
    )))
}

fn build_bitcoincharts(
    key: &ExchangeKey,
    settings: &ExchangeSettings,
    http: &HttpClient,
) -> Result<Arc<dyn Exchange>, ExchangeError> {
    let market = key.variant.as_deref().ok_or_else(|| {
        ExchangeError::InvalidSymbol(
            "bitcoincharts needs a market, e.g. bitcoincharts:bitstamp".to_string(),
        )
    })?;

    Ok(Arc::new(BitcoinchartsExchange::new(
        &key.name(),
        market,
        settings.bitcoincharts.clone(),
        http.clone(),
    )))
}
