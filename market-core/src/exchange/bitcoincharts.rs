// =================================================================
// exchange/bitcoincharts.rs - bitcoincharts Exchange Implementation
// =================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    errors::ExchangeError,
    http::HttpClient,
    traits::Exchange,
    types::{BitcoinchartsMarket, BitcoinchartsTradeRow},
    utils::{convert_bitcoincharts_market, convert_bitcoincharts_trade, deliver},
};
use market_common::data::{MarketData, Pair, Symbol, Trade};

const BITCOINCHARTS_API_URL: &str = "http://api.bitcoincharts.com/v1";

/// Connection settings for bitcoincharts
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BitcoinchartsConfig {
    pub api_url: String,
    /// Directory of downloaded `<symbol>.csv` histories read instead of the API
    pub cache_dir: Option<PathBuf>,
}

impl Default for BitcoinchartsConfig {
    fn default() -> Self {
        Self {
            api_url: BITCOINCHARTS_API_URL.to_string(),
            cache_dir: None,
        }
    }
}

/// Read-only driver for one market aggregated by bitcoincharts
///
/// bitcoincharts only tracks bitcoin, so every pair is `btc_<currency>`
/// and maps to a venue symbol such as `bitstampUSD`.
pub struct BitcoinchartsExchange {
    name: String,
    market: String,
    config: BitcoinchartsConfig,
    http: HttpClient,
}

impl BitcoinchartsExchange {
    /// Create a driver for `market` (e.g. `bitstamp`), registered under `name`
    pub fn new(name: &str, market: &str, config: BitcoinchartsConfig, http: HttpClient) -> Self {
        Self {
            name: name.to_string(),
            market: market.to_string(),
            config,
            http,
        }
    }

    /// Venue symbol for a pair, e.g. `btc_usd` on bitstamp -> `bitstampUSD`
    fn symbol_for(&self, pair: &Pair) -> Result<String, ExchangeError> {
        if pair.base.as_str() != "btc" {
            return Err(ExchangeError::InvalidSymbol(format!(
                "bitcoincharts only tracks btc pairs, not {}",
                pair
            )));
        }

        Ok(format!(
            "{}{}",
            self.market,
            pair.counter.as_str().to_uppercase()
        ))
    }

    async fn markets(&self) -> Result<Vec<BitcoinchartsMarket>, ExchangeError> {
        self.http
            .get_json(&format!("{}/markets.json", self.config.api_url), &[])
            .await
    }

    /// Trade CSV for `symbol`, from the cache directory when one is configured
    async fn trades_csv(&self, symbol: &str, after: DateTime<Utc>) -> Result<String, ExchangeError> {
        if let Some(dir) = &self.config.cache_dir {
            let path = dir.join(format!("{}.csv", symbol));
            info!("Using cached bitcoincharts history file {}", path.display());
            return Ok(tokio::fs::read_to_string(&path).await?);
        }

        self.http
            .get_text(
                &format!("{}/trades.csv", self.config.api_url),
                &[
                    ("symbol", symbol.to_string()),
                    ("start", after.timestamp().to_string()),
                ],
            )
            .await
    }

    /// Decode `trades.csv` and push trades newer than `after`, up to `budget`
    async fn deliver_csv_trades(
        &self,
        pair: &Pair,
        csv_body: &str,
        after: DateTime<Utc>,
        budget: usize,
        sink: &mpsc::Sender<Trade>,
    ) -> Result<usize, ExchangeError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(csv_body.as_bytes());

        let mut delivered = 0usize;
        for row in reader.deserialize::<BitcoinchartsTradeRow>() {
            if delivered >= budget {
                break;
            }

            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping malformed bitcoincharts row: {}", e);
                    continue;
                }
            };

            if row.timestamp <= after.timestamp() {
                continue;
            }

            match convert_bitcoincharts_trade(&self.name, pair, row.timestamp, row.price, row.amount)
            {
                Ok(trade) => {
                    deliver(sink, trade).await?;
                    delivered += 1;
                }
                Err(e) => warn!("Failed to convert bitcoincharts trade: {}", e),
            }
        }

        Ok(delivered)
    }
}

#[async_trait]
impl Exchange for BitcoinchartsExchange {
    fn name(&self) -> &str {
        &self.name
    }

    async fn market_data(&self, pair: &Pair) -> Result<MarketData, ExchangeError> {
        let symbol = self.symbol_for(pair)?;

        let market = self
            .markets()
            .await?
            .into_iter()
            .find(|m| m.symbol == symbol)
            .ok_or_else(|| ExchangeError::InvalidSymbol(format!("Unknown pair {}", pair)))?;

        convert_bitcoincharts_market(pair, market)
    }

    async fn trade_history(
        &self,
        pairs: &[Pair],
        after: DateTime<Utc>,
        limit: usize,
        sink: mpsc::Sender<Trade>,
    ) -> Result<(), ExchangeError> {
        if pairs.is_empty() {
            return Err(ExchangeError::InvalidSymbol("No pairs provided".to_string()));
        }

        let mut remaining = limit;
        for pair in pairs {
            if remaining == 0 {
                break;
            }

            let symbol = self.symbol_for(pair)?;
            let body = self.trades_csv(&symbol, after).await?;
            let delivered = self
                .deliver_csv_trades(pair, &body, after, remaining, &sink)
                .await?;

            debug!("Delivered {} bitcoincharts trades for {}", delivered, pair);
            remaining -= delivered;
        }

        Ok(())
    }

    async fn pairs(&self) -> Result<Vec<Pair>, ExchangeError> {
        let btc = Symbol::new("btc")?;

        let mut pairs = Vec::new();
        for market in self.markets().await? {
            let Some(suffix) = market.symbol.strip_prefix(&self.market) else {
                continue;
            };
            if !suffix.eq_ignore_ascii_case(&market.currency) {
                continue;
            }
            pairs.push(Pair::new(btc.clone(), Symbol::new(&market.currency)?));
        }

        pairs.sort();
        pairs.dedup();
        Ok(pairs)
    }
}
