// =================================================================
// exchange/types.rs - Data Structures
// =================================================================

use chrono::{serde::ts_seconds, DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

/// Ticker entry from the btce public API (`/ticker/{pair}`)
#[derive(Debug, Deserialize, Clone)]
pub struct BtceTicker {
    pub high: Decimal,
    pub low: Decimal,
    pub avg: Decimal,
    pub vol: Decimal,
    pub vol_cur: Decimal,
    pub last: Decimal,
    /// Price buyers are paying, i.e. the bid
    pub buy: Decimal,
    /// Price sellers are asking
    pub sell: Decimal,
    #[serde(with = "ts_seconds")]
    pub updated: DateTime<Utc>,
}

/// Trade entry from the btce public API (`/trades/{pairs}`)
#[derive(Debug, Deserialize, Clone)]
pub struct BtceTrade {
    /// `bid` or `ask`
    #[serde(rename = "type")]
    pub side: String,
    pub price: Decimal,
    pub amount: Decimal,
    pub tid: u64,
    #[serde(with = "ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

/// Response of `/info`
#[derive(Debug, Deserialize, Clone)]
pub struct BtceInfo {
    #[serde(with = "ts_seconds")]
    pub server_time: DateTime<Utc>,
    pub pairs: HashMap<String, BtcePairInfo>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BtcePairInfo {
    pub decimal_places: u32,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub min_amount: Decimal,
    #[serde(default)]
    pub hidden: u8,
    pub fee: Decimal,
}

/// Error body the btce public API returns for bad requests
#[derive(Debug, Deserialize, Clone)]
pub struct BtceErrorResponse {
    #[serde(default)]
    pub success: i64,
    pub error: String,
}

/// Envelope wrapping every btce private API response
#[derive(Debug, Deserialize)]
pub struct BtcePrivateResponse {
    pub success: i64,
    #[serde(rename = "return")]
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// `return` payload of the private `getInfo` method
#[derive(Debug, Deserialize, Clone)]
pub struct BtceAccountInfo {
    #[serde(default)]
    pub funds: HashMap<String, Decimal>,
    #[serde(default)]
    pub transaction_count: u64,
    #[serde(default)]
    pub open_orders: u64,
    #[serde(with = "ts_seconds")]
    pub server_time: DateTime<Utc>,
}

/// Book for one pair from `/depth/{pair}`, levels as `[price, amount]`
#[derive(Debug, Deserialize, Clone)]
pub struct BtceDepth {
    #[serde(default)]
    pub asks: Vec<(Decimal, Decimal)>,
    #[serde(default)]
    pub bids: Vec<(Decimal, Decimal)>,
}

/// Entry of the private `TransHistory` payload, keyed by transaction id
#[derive(Debug, Deserialize, Clone)]
pub struct BtceTransaction {
    #[serde(rename = "type")]
    pub kind: u8,
    pub amount: Decimal,
    pub currency: String,
    #[serde(default)]
    pub desc: String,
    pub status: u8,
    #[serde(with = "ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

/// Market entry from bitcoincharts `markets.json`
///
/// Quiet markets report `null` quotes.
#[derive(Debug, Deserialize, Clone)]
pub struct BitcoinchartsMarket {
    pub symbol: String,
    pub currency: String,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    #[serde(with = "ts_seconds")]
    pub latest_trade: DateTime<Utc>,
    pub close: Option<Decimal>,
    pub volume: Option<Decimal>,
}

/// Row of bitcoincharts `trades.csv`: `unixtime,price,amount`
#[derive(Debug, Deserialize, Clone)]
pub struct BitcoinchartsTradeRow {
    pub timestamp: i64,
    pub price: Decimal,
    pub amount: Decimal,
}
