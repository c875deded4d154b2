// =================================================================
// exchange/btce.rs - btce Exchange Implementation
// =================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    errors::ExchangeError,
    http::{decode_json, HttpClient},
    traits::Exchange,
    types::{
        BtceAccountInfo, BtceDepth, BtceErrorResponse, BtceInfo, BtcePrivateResponse, BtceTicker,
        BtceTrade, BtceTransaction,
    },
    utils::{
        build_btce_pair_path, convert_btce_depth, convert_btce_ticker, convert_btce_trade,
        convert_btce_transaction, deliver, encode_private_body, sign_payload,
    },
};
use market_common::data::{Balances, MarketData, OrderBook, Pair, Symbol, Trade, Transaction};

// Constants
const BTCE_PUBLIC_API_URL: &str = "https://btc-e.com/api/3";
const BTCE_PRIVATE_API_URL: &str = "https://btc-e.com/tapi";
/// Largest page the public trades and depth endpoints serve
const MAX_PAGE_LIMIT: usize = 2000;

/// Connection settings for btce
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct BtceConfig {
    pub public_api_url: String,
    pub private_api_url: String,
    /// API key for private calls
    pub key: Option<String>,
    /// API secret used to sign private calls
    pub secret: Option<String>,
}

impl Default for BtceConfig {
    fn default() -> Self {
        Self {
            public_api_url: BTCE_PUBLIC_API_URL.to_string(),
            private_api_url: BTCE_PRIVATE_API_URL.to_string(),
            key: None,
            secret: None,
        }
    }
}

impl fmt::Debug for BtceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BtceConfig")
            .field("public_api_url", &self.public_api_url)
            .field("private_api_url", &self.private_api_url)
            .field("key", &self.key)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// btce exchange driver
pub struct BtceExchange {
    name: String,
    config: BtceConfig,
    http: HttpClient,
    last_nonce: AtomicU64,
}

impl BtceExchange {
    /// Create a new btce driver registered under `name`
    pub fn new(name: &str, config: BtceConfig, http: HttpClient) -> Self {
        Self {
            name: name.to_string(),
            config,
            http,
            last_nonce: AtomicU64::new(0),
        }
    }

    /// GET a public endpoint, turning venue error bodies into `ApiError`
    async fn public_get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let body = self
            .http
            .get_text(url, query)
            .await
            .map_err(Self::public_api_error)?;

        if let Ok(err) = serde_json::from_str::<BtceErrorResponse>(&body) {
            return Err(ExchangeError::ApiError(err.error));
        }

        decode_json(&body)
    }

    /// Extract the venue message from an HTTP error body when there is one
    fn public_api_error(err: ExchangeError) -> ExchangeError {
        match err {
            ExchangeError::HttpStatus { status, body } => {
                match serde_json::from_str::<BtceErrorResponse>(&body) {
                    Ok(venue) => ExchangeError::ApiError(venue.error),
                    Err(_) => ExchangeError::HttpStatus { status, body },
                }
            }
            other => other,
        }
    }

    /// Seconds-resolution nonce, strictly increasing per driver
    ///
    /// btce rejects nonces wider than a unix timestamp.
    fn next_nonce(&self) -> u64 {
        let now = Utc::now().timestamp().max(0) as u64;
        let mut current = self.last_nonce.load(Ordering::SeqCst);
        loop {
            let next = now.max(current + 1);
            match self.last_nonce.compare_exchange(
                current,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    fn credentials(&self) -> Result<(&str, &str), ExchangeError> {
        match (self.config.key.as_deref(), self.config.secret.as_deref()) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Ok((key, secret))
            }
            _ => Err(ExchangeError::MissingCredentials(
                "btce private API needs BTCE_KEY and BTCE_SECRET".to_string(),
            )),
        }
    }

    /// Make a signed call to the private API and decode its `return` payload
    async fn private_call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let (key, secret) = self.credentials()?;
        let body = encode_private_body(method, self.next_nonce(), params);
        let signature = sign_payload(secret, &body)?;

        debug!("Calling btce private method {}", method);

        let text = self
            .http
            .post_form(
                &self.config.private_api_url,
                body,
                &[("Key", key.to_string()), ("Sign", signature)],
            )
            .await?;

        // Malformed requests get a plain-text answer instead of JSON
        if text.trim() == "invalid POST data" {
            return Err(ExchangeError::ApiError("invalid POST data".to_string()));
        }

        let envelope: BtcePrivateResponse = decode_json(&text)?;
        if envelope.success != 1 {
            return Err(ExchangeError::ApiError(
                envelope
                    .error
                    .unwrap_or_else(|| "request failed".to_string()),
            ));
        }

        let payload = envelope.payload.ok_or_else(|| {
            ExchangeError::ParseError(format!("{} response has no return value", method))
        })?;

        Ok(serde_json::from_value(payload)?)
    }
}

#[async_trait]
impl Exchange for BtceExchange {
    fn name(&self) -> &str {
        &self.name
    }

    async fn market_data(&self, pair: &Pair) -> Result<MarketData, ExchangeError> {
        let key = pair.to_string();
        let url = format!("{}/ticker/{}", self.config.public_api_url, key);

        let mut tickers: HashMap<String, BtceTicker> = self.public_get(&url, &[]).await?;
        let ticker = tickers
            .remove(&key)
            .ok_or_else(|| ExchangeError::InvalidSymbol(format!("No ticker for {}", key)))?;

        Ok(convert_btce_ticker(pair, ticker))
    }

    async fn trade_history(
        &self,
        pairs: &[Pair],
        after: DateTime<Utc>,
        limit: usize,
        sink: mpsc::Sender<Trade>,
    ) -> Result<(), ExchangeError> {
        let path = build_btce_pair_path(pairs)?;
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        let url = format!("{}/trades/{}", self.config.public_api_url, path);

        let mut response: HashMap<String, Vec<BtceTrade>> = self
            .public_get(&url, &[("limit", limit.to_string())])
            .await?;

        let mut delivered = 0usize;
        for pair in pairs {
            let Some(rows) = response.remove(&pair.to_string()) else {
                warn!("btce returned no trades section for {}", pair);
                continue;
            };

            for raw in rows.into_iter().filter(|t| t.timestamp > after) {
                match convert_btce_trade(&self.name, pair, raw) {
                    Ok(trade) => {
                        deliver(&sink, trade).await?;
                        delivered += 1;
                    }
                    Err(e) => warn!("Failed to convert btce trade: {}", e),
                }
            }
        }

        debug!("Delivered {} btce trades for {}", delivered, path);
        Ok(())
    }

    async fn pairs(&self) -> Result<Vec<Pair>, ExchangeError> {
        let info: BtceInfo = self
            .public_get(&format!("{}/info", self.config.public_api_url), &[])
            .await?;

        let mut pairs = info
            .pairs
            .into_iter()
            .filter(|(_, details)| details.hidden == 0)
            .map(|(key, _)| key.parse::<Pair>())
            .collect::<Result<Vec<_>, _>>()?;
        pairs.sort();

        info!("btce lists {} pairs", pairs.len());
        Ok(pairs)
    }

    async fn balance(&self, symbols: &[Symbol]) -> Result<Balances, ExchangeError> {
        let account: BtceAccountInfo = self.private_call("getInfo", &[]).await?;

        let mut balances = Balances::new();
        for (code, amount) in account.funds {
            let symbol = Symbol::new(&code)?;
            if symbols.is_empty() || symbols.contains(&symbol) {
                balances.insert(symbol, amount);
            }
        }

        Ok(balances)
    }

    async fn order_book(&self, pair: &Pair, limit: usize) -> Result<OrderBook, ExchangeError> {
        let key = pair.to_string();
        let url = format!("{}/depth/{}", self.config.public_api_url, key);
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);

        let mut books: HashMap<String, BtceDepth> = self
            .public_get(&url, &[("limit", limit.to_string())])
            .await?;
        let depth = books
            .remove(&key)
            .ok_or_else(|| ExchangeError::InvalidSymbol(format!("No depth for {}", key)))?;

        Ok(convert_btce_depth(pair, depth))
    }

    async fn transactions(&self, limit: usize) -> Result<Vec<Transaction>, ExchangeError> {
        let params = [
            ("count", limit.max(1).to_string()),
            ("order", "DESC".to_string()),
        ];
        // btce answers an empty history with an error instead of an empty map
        let history: HashMap<String, BtceTransaction> =
            match self.private_call("TransHistory", &params).await {
                Ok(history) => history,
                Err(ExchangeError::ApiError(msg)) if msg == "no transactions" => HashMap::new(),
                Err(e) => return Err(e),
            };

        let mut transactions = history
            .into_iter()
            .map(|(id, raw)| convert_btce_transaction(id, raw))
            .collect::<Result<Vec<_>, _>>()?;
        transactions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));

        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::http::HttpConfig;
    use crate::exchange::testing::serve;
    use axum::{
        extract::{Path, Query},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::{get, post},
        Router,
    };
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Mutex};

    const TICKER: &str = r#"{"btc_usd":{"high":640,"low":590.5,"avg":615.25,"vol":1520344.1,
        "vol_cur":2412.7,"last":612.1,"buy":612.5,"sell":611.9,"updated":1386741355}}"#;

    const TRADES: &str = r#"{
        "btc_usd":[
            {"type":"ask","price":612.1,"amount":0.25,"tid":3541221,"timestamp":1386741355},
            {"type":"bid","price":612.4,"amount":1.5,"tid":3541220,"timestamp":1386741300},
            {"type":"bid","price":611.0,"amount":2,"tid":3541100,"timestamp":1386740000}
        ],
        "ltc_btc":[
            {"type":"bid","price":0.042,"amount":10,"tid":3541219,"timestamp":1386741350}
        ]}"#;

    const INFO: &str = r#"{"server_time":1386741355,"pairs":{
        "ltc_btc":{"decimal_places":5,"min_price":0.0001,"max_price":10,"min_amount":0.1,"hidden":0,"fee":0.2},
        "btc_usd":{"decimal_places":3,"min_price":0.1,"max_price":3200,"min_amount":0.01,"hidden":0,"fee":0.2},
        "nvc_usd":{"decimal_places":3,"min_price":0.1,"max_price":3200,"min_amount":0.01,"hidden":1,"fee":0.2}}}"#;

    fn client() -> HttpClient {
        HttpClient::new(HttpConfig {
            max_attempts: 2,
            timeout_secs: 5,
            retry_delay_ms: 1,
        })
        .unwrap()
    }

    fn driver(url: &str, key: Option<&str>, secret: Option<&str>) -> BtceExchange {
        BtceExchange::new(
            "btce",
            BtceConfig {
                public_api_url: url.to_string(),
                private_api_url: format!("{}/tapi", url),
                key: key.map(str::to_string),
                secret: secret.map(str::to_string),
            },
            client(),
        )
    }

    async fn public_server(seen_limits: Arc<Mutex<Vec<String>>>) -> String {
        let router = Router::new()
            .route(
                "/ticker/:pair",
                get(|Path(pair): Path<String>| async move {
                    if pair == "btc_usd" {
                        (StatusCode::OK, TICKER.to_string())
                    } else {
                        (
                            StatusCode::OK,
                            format!(r#"{{"success":0,"error":"Invalid pair name: {}"}}"#, pair),
                        )
                    }
                }),
            )
            .route(
                "/trades/:pairs",
                get(
                    move |Query(query): Query<HashMap<String, String>>| async move {
                        seen_limits
                            .lock()
                            .unwrap()
                            .push(query.get("limit").cloned().unwrap_or_default());
                        TRADES
                    },
                ),
            )
            .route("/info", get(|| async { INFO }))
            .route(
                "/depth/:pair",
                get(
                    |Path(pair): Path<String>, Query(query): Query<HashMap<String, String>>| async move {
                        let limit = query.get("limit").cloned().unwrap_or_default();
                        format!(
                            r#"{{"{}":{{"asks":[[612.0,1.2],[612.5,0.4]],"bids":[[611.8,{}]]}}}}"#,
                            pair, limit
                        )
                    },
                ),
            )
            .route(
                "/broken",
                get(|| async {
                    (
                        StatusCode::BAD_REQUEST,
                        r#"{"success":0,"error":"Requests too often"}"#,
                    )
                        .into_response()
                }),
            );

        serve(router).await
    }

    #[tokio::test]
    async fn test_market_data() {
        let url = public_server(Arc::new(Mutex::new(Vec::new()))).await;
        let btce = driver(&url, None, None);

        let data = btce.market_data(&"btc_usd".parse().unwrap()).await.unwrap();

        assert_eq!(data.bid, dec!(612.5));
        assert_eq!(data.ask, dec!(611.9));
        assert_eq!(data.last, dec!(612.1));
        assert_eq!(data.volume, dec!(1520344.1));
        assert_eq!(data.updated.timestamp(), 1386741355);
    }

    #[tokio::test]
    async fn test_market_data_surfaces_venue_error() {
        let url = public_server(Arc::new(Mutex::new(Vec::new()))).await;
        let btce = driver(&url, None, None);

        let result = btce.market_data(&"btc_xxx".parse().unwrap()).await;

        match result {
            Err(ExchangeError::ApiError(msg)) => assert_eq!(msg, "Invalid pair name: btc_xxx"),
            other => panic!("Expected ApiError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_status_body_is_decoded() {
        let url = public_server(Arc::new(Mutex::new(Vec::new()))).await;
        let btce = driver(&url, None, None);

        let result: Result<HashMap<String, BtceTicker>, _> =
            btce.public_get(&format!("{}/broken", url), &[]).await;

        assert!(matches!(result, Err(ExchangeError::ApiError(msg)) if msg == "Requests too often"));
    }

    #[tokio::test]
    async fn test_trade_history_filters_and_caps() {
        let limits = Arc::new(Mutex::new(Vec::new()));
        let url = public_server(limits.clone()).await;
        let btce = driver(&url, None, None);

        let pairs: Vec<Pair> = vec!["btc_usd".parse().unwrap(), "ltc_btc".parse().unwrap()];
        let after = DateTime::<Utc>::from_timestamp(1386740500, 0).unwrap();
        let (tx, mut rx) = mpsc::channel(16);

        btce.trade_history(&pairs, after, 5000, tx).await.unwrap();

        let mut ids = Vec::new();
        while let Some(trade) = rx.recv().await {
            assert_eq!(trade.exchange, "btce");
            ids.push(trade.id);
        }

        assert_eq!(ids, vec!["3541221", "3541220", "3541219"]);
        assert_eq!(*limits.lock().unwrap(), vec!["2000".to_string()]);
    }

    #[tokio::test]
    async fn test_trade_history_stops_when_sink_closes() {
        let url = public_server(Arc::new(Mutex::new(Vec::new()))).await;
        let btce = driver(&url, None, None);

        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let result = btce
            .trade_history(&["btc_usd".parse().unwrap()], DateTime::<Utc>::MIN_UTC, 10, tx)
            .await;

        assert!(matches!(result, Err(ExchangeError::SinkClosed)));
    }

    #[tokio::test]
    async fn test_order_book_caps_limit() {
        let url = public_server(Arc::new(Mutex::new(Vec::new()))).await;
        let btce = driver(&url, None, None);

        // the mock echoes the requested limit as the bid amount
        let book = btce
            .order_book(&"ltc_btc".parse().unwrap(), 9000)
            .await
            .unwrap();

        assert_eq!(book.pair.to_string(), "ltc_btc");
        assert_eq!(book.asks.len(), 2);
        assert_eq!(book.best_ask().map(|l| l.price), Some(dec!(612)));
        assert_eq!(book.best_bid().map(|l| l.amount), Some(dec!(2000)));
    }

    #[tokio::test]
    async fn test_pairs_skip_hidden() {
        let url = public_server(Arc::new(Mutex::new(Vec::new()))).await;
        let btce = driver(&url, None, None);

        let pairs: Vec<String> = btce
            .pairs()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.to_string())
            .collect();

        assert_eq!(pairs, vec!["btc_usd", "ltc_btc"]);
    }

    const TRANS_HISTORY: &str = r#"{"success":1,"return":{
        "1081672":{"type":1,"amount":1.0,"currency":"BTC","desc":"BTC Payment","status":2,"timestamp":1342448420},
        "1081673":{"type":4,"amount":-25.5,"currency":"USD","desc":"Fee","status":2,"timestamp":1342448500}}}"#;

    async fn private_server() -> String {
        let router = Router::new().route(
            "/tapi",
            post(|headers: HeaderMap, body: String| async move {
                let key = headers.get("Key").and_then(|v| v.to_str().ok()).unwrap_or("");
                let sign = headers.get("Sign").and_then(|v| v.to_str().ok()).unwrap_or("");

                if key.is_empty() {
                    return r#"{"success":0,"error":"Missing key header"}"#;
                }
                if sign != sign_payload("credentials", &body).unwrap() {
                    return r#"{"success":0,"error":"invalid sign"}"#;
                }
                if body.starts_with("method=TransHistory&nonce=")
                    && body.ends_with("&count=2&order=DESC")
                {
                    return TRANS_HISTORY;
                }
                if !body.starts_with("method=getInfo&nonce=") {
                    return "invalid POST data";
                }

                r#"{"success":1,"return":{
                    "funds":{"usd":325,"btc":2.498,"ltc":0},
                    "rights":{"info":1,"trade":0},
                    "transaction_count":0,"open_orders":1,
                    "server_time":1386741355}}"#
            }),
        );

        serve(router).await
    }

    #[tokio::test]
    async fn test_balance_with_valid_signature() {
        let url = private_server().await;
        let btce = driver(&url, Some("valid"), Some("credentials"));

        let all = btce.balance(&[]).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[&Symbol::new("usd").unwrap()], dec!(325));

        let only_btc = btce.balance(&[Symbol::new("BTC").unwrap()]).await.unwrap();
        assert_eq!(only_btc.len(), 1);
        assert_eq!(only_btc[&Symbol::new("btc").unwrap()], dec!(2.498));
    }

    #[tokio::test]
    async fn test_balance_with_wrong_secret() {
        let url = private_server().await;
        let btce = driver(&url, Some("valid"), Some("llamas"));

        let result = btce.balance(&[]).await;

        assert!(matches!(result, Err(ExchangeError::ApiError(msg)) if msg == "invalid sign"));
    }

    #[tokio::test]
    async fn test_transactions_newest_first() {
        let url = private_server().await;
        let btce = driver(&url, Some("valid"), Some("credentials"));

        let transactions = btce.transactions(2).await.unwrap();

        let ids: Vec<&str> = transactions.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1081673", "1081672"]);
        assert_eq!(transactions[0].symbol.as_str(), "usd");
        assert_eq!(transactions[0].amount, dec!(-25.5));
        assert_eq!(transactions[1].description, "BTC Payment");
    }

    #[tokio::test]
    async fn test_balance_without_credentials() {
        let btce = driver("http://127.0.0.1:9", None, None);

        assert!(matches!(
            btce.balance(&[]).await,
            Err(ExchangeError::MissingCredentials(_))
        ));
    }

    #[test]
    fn test_nonce_is_strictly_increasing() {
        let btce = driver("http://127.0.0.1:9", None, None);
        let first = btce.next_nonce();
        let second = btce.next_nonce();
        assert!(second > first);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = BtceConfig {
            secret: Some("hunter2".to_string()),
            ..BtceConfig::default()
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }
}
