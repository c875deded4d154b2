// Test doubles shared by the exchange and service tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use market_common::data::{MarketData, Pair, Trade};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::{Exchange, ExchangeError};

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// One scripted answer to a `trade_history` call
pub struct HistoryReply {
    pub trades: Vec<Trade>,
    /// Error returned after the trades have been pushed
    pub error: Option<ExchangeError>,
}

impl HistoryReply {
    pub fn ok(trades: Vec<Trade>) -> Self {
        Self { trades, error: None }
    }

    pub fn partial(trades: Vec<Trade>, error: ExchangeError) -> Self {
        Self {
            trades,
            error: Some(error),
        }
    }
}

/// Arguments a `trade_history` call was made with
#[derive(Debug, Clone)]
pub struct HistoryCall {
    pub pairs: Vec<Pair>,
    pub after: DateTime<Utc>,
    pub limit: usize,
    pub made_at: DateTime<Utc>,
}

/// Exchange that replays scripted results
///
/// Once a script runs dry, market data keeps repeating the last snapshot and
/// trade history returns no trades.
#[derive(Default)]
pub struct ScriptedExchange {
    market: Mutex<VecDeque<Result<MarketData, ExchangeError>>>,
    last_market: Mutex<Option<MarketData>>,
    history: Mutex<VecDeque<HistoryReply>>,
    pub market_calls: Mutex<usize>,
    pub history_calls: Mutex<Vec<HistoryCall>>,
}

impl ScriptedExchange {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_market(&self, reply: Result<MarketData, ExchangeError>) {
        self.market.lock().unwrap().push_back(reply);
    }

    pub fn push_history(&self, reply: HistoryReply) {
        self.history.lock().unwrap().push_back(reply);
    }

    pub fn market_call_count(&self) -> usize {
        *self.market_calls.lock().unwrap()
    }

    pub fn history_log(&self) -> Vec<HistoryCall> {
        self.history_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Exchange for ScriptedExchange {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn market_data(&self, pair: &Pair) -> Result<MarketData, ExchangeError> {
        *self.market_calls.lock().unwrap() += 1;

        let next = self.market.lock().unwrap().pop_front();
        match next {
            Some(Ok(data)) => {
                *self.last_market.lock().unwrap() = Some(data.clone());
                Ok(data)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last_market
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ExchangeError::ApiError(format!("no data for {}", pair))),
        }
    }

    async fn trade_history(
        &self,
        pairs: &[Pair],
        after: DateTime<Utc>,
        limit: usize,
        sink: mpsc::Sender<Trade>,
    ) -> Result<(), ExchangeError> {
        self.history_calls.lock().unwrap().push(HistoryCall {
            pairs: pairs.to_vec(),
            after,
            limit,
            made_at: Utc::now(),
        });

        let reply = self.history.lock().unwrap().pop_front();
        let Some(reply) = reply else {
            return Ok(());
        };

        for trade in reply.trades {
            super::utils::deliver(&sink, trade).await?;
        }

        match reply.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
