// exchange/traits.rs

use super::ExchangeError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use market_common::data::{Balances, MarketData, OrderBook, Pair, Symbol, Trade, Transaction};
use tokio::sync::mpsc;

/// Main exchange interface that all exchange drivers must follow
///
/// Pollers only rely on [`Exchange::market_data`] and
/// [`Exchange::trade_history`]. The remaining operations are optional and
/// report [`ExchangeError::NotSupported`] unless a driver overrides them.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Registry key of the venue, e.g. `btce` or `bitcoincharts:bitstamp`
    fn name(&self) -> &str;

    /// Fetch a single market snapshot for `pair`
    async fn market_data(&self, pair: &Pair) -> Result<MarketData, ExchangeError>;

    /// Query trades on `pairs` executed after `after`
    ///
    /// Trades are pushed into `sink` as they are decoded, in no particular
    /// order. Venues may return fewer than `limit` trades. On failure the
    /// trades already pushed stay delivered.
    async fn trade_history(
        &self,
        pairs: &[Pair],
        after: DateTime<Utc>,
        limit: usize,
        sink: mpsc::Sender<Trade>,
    ) -> Result<(), ExchangeError>;

    /// Pairs traded on the venue
    async fn pairs(&self) -> Result<Vec<Pair>, ExchangeError> {
        Err(ExchangeError::not_supported(self.name(), "pairs"))
    }

    /// Account balances for `symbols`, or every non-empty balance if none given
    async fn balance(&self, _symbols: &[Symbol]) -> Result<Balances, ExchangeError> {
        Err(ExchangeError::not_supported(self.name(), "balance"))
    }

    /// Top `limit` levels on each side of the book for `pair`
    async fn order_book(&self, _pair: &Pair, _limit: usize) -> Result<OrderBook, ExchangeError> {
        Err(ExchangeError::not_supported(self.name(), "order_book"))
    }

    /// Most recent `limit` account transactions, newest first
    async fn transactions(&self, _limit: usize) -> Result<Vec<Transaction>, ExchangeError> {
        Err(ExchangeError::not_supported(self.name(), "transactions"))
    }
}
