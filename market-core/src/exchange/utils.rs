// =================================================================
// exchange/utils.rs - Utility Functions
// =================================================================

use super::{BitcoinchartsMarket, BtceDepth, BtceTicker, BtceTrade, BtceTransaction, ExchangeError};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use market_common::data::{
    MarketData, OrderBook, Pair, PriceLevel, Symbol, Trade, TradeSide, Transaction,
};
use rust_decimal::Decimal;
use sha2::Sha512;
use tokio::sync::mpsc;
use url::form_urlencoded;

type HmacSha512 = Hmac<Sha512>;

/// Convert a btce ticker entry to the normalized snapshot
pub fn convert_btce_ticker(pair: &Pair, ticker: BtceTicker) -> MarketData {
    MarketData {
        pair: pair.clone(),
        bid: ticker.buy,
        ask: ticker.sell,
        last: ticker.last,
        volume: ticker.vol,
        updated: ticker.updated,
    }
}

/// Convert a btce trade entry to the standard Trade format
pub fn convert_btce_trade(
    exchange: &str,
    pair: &Pair,
    raw: BtceTrade,
) -> Result<Trade, ExchangeError> {
    if raw.price <= Decimal::ZERO {
        return Err(ExchangeError::ParseError(format!(
            "Price must be positive (tid {})",
            raw.tid
        )));
    }

    Ok(Trade {
        id: raw.tid.to_string(),
        pair: pair.clone(),
        amount: raw.amount,
        rate: raw.price,
        timestamp: raw.timestamp,
        side: raw.side.parse()?,
        exchange: exchange.to_string(),
    })
}

/// Convert a btce depth entry to an order book
pub fn convert_btce_depth(pair: &Pair, depth: BtceDepth) -> OrderBook {
    let levels = |rows: Vec<(Decimal, Decimal)>| -> Vec<PriceLevel> {
        rows.into_iter()
            .map(|(price, amount)| PriceLevel { price, amount })
            .collect()
    };

    OrderBook {
        pair: pair.clone(),
        asks: levels(depth.asks),
        bids: levels(depth.bids),
    }
}

/// Convert a `TransHistory` entry, keyed by `id` in the payload
pub fn convert_btce_transaction(
    id: String,
    raw: BtceTransaction,
) -> Result<Transaction, ExchangeError> {
    Ok(Transaction {
        id,
        symbol: Symbol::new(&raw.currency)?,
        amount: raw.amount,
        timestamp: raw.timestamp,
        description: raw.desc,
    })
}

/// Convert a bitcoincharts market to the normalized snapshot
pub fn convert_bitcoincharts_market(
    pair: &Pair,
    market: BitcoinchartsMarket,
) -> Result<MarketData, ExchangeError> {
    let missing = |field: &str| {
        ExchangeError::ParseError(format!("{} has no {} quote", market.symbol, field))
    };

    Ok(MarketData {
        pair: pair.clone(),
        bid: market.bid.ok_or_else(|| missing("bid"))?,
        ask: market.ask.ok_or_else(|| missing("ask"))?,
        last: market.close.ok_or_else(|| missing("close"))?,
        volume: market.volume.unwrap_or(Decimal::ZERO),
        updated: market.latest_trade,
    })
}

/// Build a bitcoincharts trade from a CSV row
///
/// The venue has no trade ids, so one is synthesized from the row contents.
pub fn convert_bitcoincharts_trade(
    exchange: &str,
    pair: &Pair,
    timestamp: i64,
    price: Decimal,
    amount: Decimal,
) -> Result<Trade, ExchangeError> {
    let ts = DateTime::<Utc>::from_timestamp(timestamp, 0)
        .ok_or_else(|| ExchangeError::ParseError(format!("Invalid timestamp {}", timestamp)))?;

    Ok(Trade {
        id: format!("{}-{}-{}", timestamp, price.normalize(), amount.normalize()),
        pair: pair.clone(),
        amount,
        rate: price,
        timestamp: ts,
        // bitcoincharts does not report the aggressor
        side: TradeSide::Buy,
        exchange: exchange.to_string(),
    })
}

/// Build the `pair-pair-...` path segment btce uses for multi-pair queries
pub fn build_btce_pair_path(pairs: &[Pair]) -> Result<String, ExchangeError> {
    if pairs.is_empty() {
        return Err(ExchangeError::InvalidSymbol("No pairs provided".to_string()));
    }

    Ok(pairs
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("-"))
}

/// HMAC-SHA512 of `payload` keyed with `secret`, hex encoded
pub fn sign_payload(secret: &str, payload: &str) -> Result<String, ExchangeError> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::MissingCredentials(format!("Unusable secret: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Form body for a signed private call: `method` and `nonce` first, then params
pub fn encode_private_body(method: &str, nonce: u64, params: &[(&str, String)]) -> String {
    let mut body = form_urlencoded::Serializer::new(String::new());
    body.append_pair("method", method);
    body.append_pair("nonce", &nonce.to_string());
    for (key, value) in params {
        body.append_pair(key, value);
    }
    body.finish()
}

/// Push a trade into a history sink, failing once the receiver is gone
pub async fn deliver(sink: &mpsc::Sender<Trade>, trade: Trade) -> Result<(), ExchangeError> {
    sink.send(trade).await.map_err(|_| ExchangeError::SinkClosed)
}
