// =================================================================
// data/types.rs - Normalized Market Data Model
// =================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while building or parsing data model values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Invalid pair: {0}")]
    InvalidPair(String),

    #[error("Invalid instrument: {0}")]
    InvalidInstrument(String),

    #[error("Invalid trade side: {0}")]
    InvalidSide(String),
}

/// A currency code such as `btc` or `usd`, stored lower-case
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn new(code: &str) -> Result<Self, DataError> {
        let code = code.trim();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DataError::InvalidSymbol(code.to_string()));
        }
        Ok(Self(code.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Symbol {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = DataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A trading instrument between two currencies, written `base_counter`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pair {
    pub base: Symbol,
    pub counter: Symbol,
}

impl Pair {
    pub fn new(base: Symbol, counter: Symbol) -> Self {
        Self { base, counter }
    }

    /// True if this pair appears in `pairs`
    pub fn is_in(&self, pairs: &[Pair]) -> bool {
        pairs.iter().any(|p| p == self)
    }
}

impl FromStr for Pair {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, counter) = s
            .trim()
            .split_once('_')
            .ok_or_else(|| DataError::InvalidPair(s.to_string()))?;

        let base = Symbol::new(base).map_err(|_| DataError::InvalidPair(s.to_string()))?;
        let counter = Symbol::new(counter).map_err(|_| DataError::InvalidPair(s.to_string()))?;

        Ok(Self { base, counter })
    }
}

impl TryFrom<String> for Pair {
    type Error = DataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Pair> for String {
    fn from(pair: Pair) -> Self {
        pair.to_string()
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.base, self.counter)
    }
}

/// Side of an executed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl FromStr for TradeSide {
    type Err = DataError;

    /// Venues report either `buy`/`sell` or the book side that was hit,
    /// `bid`/`ask`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" | "bid" => Ok(TradeSide::Buy),
            "sell" | "ask" => Ok(TradeSide::Sell),
            _ => Err(DataError::InvalidSide(s.to_string())),
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => f.write_str("buy"),
            TradeSide::Sell => f.write_str("sell"),
        }
    }
}

/// Snapshot of the trading state for one pair on one venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub pair: Pair,
    /// Highest price a buyer will pay
    pub bid: Decimal,
    /// Lowest price a seller will accept
    pub ask: Decimal,
    /// Price of the most recent trade
    pub last: Decimal,
    pub volume: Decimal,
    pub updated: DateTime<Utc>,
}

impl MarketData {
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }
}

impl fmt::Display for MarketData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Last: {:.6} Ask: {:.6} Bid: {:.6} Spread: {:.6} Volume: {:.2}",
            self.pair,
            self.last,
            self.ask,
            self.bid,
            self.spread(),
            self.volume
        )
    }
}

/// A single trade executed on a venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Venue-scoped trade identifier
    pub id: String,
    pub pair: Pair,
    pub amount: Decimal,
    pub rate: Decimal,
    pub timestamp: DateTime<Utc>,
    pub side: TradeSide,
    /// Name of the venue the trade was reported by
    pub exchange: String,
}

impl Trade {
    /// Globally unique identity, `exchange:pair:id`
    pub fn identity(&self) -> String {
        format!("{}:{}:{}", self.exchange, self.pair, self.id)
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:.5}@{:.5} on {}",
            self.side.to_string().to_uppercase(),
            self.pair,
            self.amount,
            self.rate,
            self.timestamp.format("%b %e %H:%M:%S")
        )
    }
}

/// Account balances keyed by currency
pub type Balances = BTreeMap<Symbol, Decimal>;

/// One price level of an order book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub amount: Decimal,
}

/// Resting orders for one pair, best prices first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub pair: Pair,
    /// Sell orders, lowest price first
    pub asks: Vec<PriceLevel>,
    /// Buy orders, highest price first
    pub bids: Vec<PriceLevel>,
}

impl OrderBook {
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }
}

/// A movement of funds on the account (deposit, withdrawal, fee, trade settlement)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub symbol: Symbol,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} ({})",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.id,
            self.amount,
            self.symbol.as_str().to_uppercase(),
            self.description
        )
    }
}

/// A pair on a named venue, written `exchange/pair`
/// (e.g. `btce/btc_usd` or `bitcoincharts:bitstamp/btc_usd`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instrument {
    pub exchange: String,
    pub pair: Pair,
}

impl FromStr for Instrument {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (exchange, pair) = s
            .split_once('/')
            .ok_or_else(|| DataError::InvalidInstrument(s.to_string()))?;

        if exchange.trim().is_empty() {
            return Err(DataError::InvalidInstrument(s.to_string()));
        }

        Ok(Self {
            exchange: exchange.trim().to_string(),
            pair: pair.parse()?,
        })
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.exchange, self.pair)
    }
}
