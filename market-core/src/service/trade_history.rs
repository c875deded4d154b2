use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tokio::{select, spawn};
use tracing::{debug, error, info, warn};

use super::dedup::DedupWindow;
use super::feed::FeedHandle;
use super::{FeedStats, ServiceError, TickErrorPolicy, TradeHistoryConfig};
use crate::exchange::{Exchange, ExchangeError};
use market_common::data::{Pair, Trade};

/// Buffer between the exchange driver and the dedup stage within one cycle
const CYCLE_BUFFER: usize = 256;

/// Trades drained from one cycle
#[derive(Debug, Default)]
struct Drained {
    received: u64,
    emitted: u64,
    duplicates: u64,
    consumer_gone: bool,
}

/// Repeatedly queries recent trades for a set of pairs and emits each
/// trade once
///
/// The first cycle runs immediately with a wide catch-up window. After the
/// first successful cycle every query uses the narrower steady window.
pub struct TradeHistoryPoller {
    exchange: Arc<dyn Exchange>,
    pairs: Vec<Pair>,
    config: TradeHistoryConfig,
}

impl TradeHistoryPoller {
    pub fn new(exchange: Arc<dyn Exchange>, pairs: Vec<Pair>) -> Self {
        Self {
            exchange,
            pairs,
            config: TradeHistoryConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TradeHistoryConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawn the polling task
    ///
    /// Pairs listed more than once are queried once.
    pub fn start(mut self) -> Result<FeedHandle<Trade>, ServiceError> {
        let mut unique = Vec::with_capacity(self.pairs.len());
        for pair in self.pairs.drain(..) {
            if !pair.is_in(&unique) {
                unique.push(pair);
            }
        }
        self.pairs = unique;

        if self.pairs.is_empty() {
            return Err(ServiceError::Validation("No pairs to poll".to_string()));
        }
        if self.config.interval.is_zero() {
            return Err(ServiceError::Validation(
                "Poll interval must be greater than zero".to_string(),
            ));
        }
        if self.config.initial.limit == 0 || self.config.steady.limit == 0 {
            return Err(ServiceError::Validation(
                "Trade limit must be greater than zero".to_string(),
            ));
        }

        info!(
            "Starting trade history poller for {} on {} every {:?}",
            pair_list(&self.pairs),
            self.exchange.name(),
            self.config.interval
        );

        let stats = Arc::new(Mutex::new(FeedStats::default()));
        let (tx, rx) = mpsc::channel(self.config.buffer.max(1));
        let (shutdown_tx, _) = broadcast::channel(1);
        let shutdown_rx = shutdown_tx.subscribe();

        let task = spawn(self.run(tx, shutdown_rx, Arc::clone(&stats)));

        Ok(FeedHandle::new(rx, shutdown_tx, task, stats))
    }

    async fn run(
        self,
        tx: mpsc::Sender<Trade>,
        mut shutdown_rx: broadcast::Receiver<()>,
        stats: Arc<Mutex<FeedStats>>,
    ) {
        let mut window = DedupWindow::new(self.config.retention);
        let mut query = self.config.initial;
        let mut caught_up = false;

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = tx.closed() => {
                    debug!("Trade consumer went away");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let now = Utc::now();
            let after = now - query.lookback;
            debug!(
                "Querying trades for {} after {} (limit {})",
                pair_list(&self.pairs),
                after,
                query.limit
            );

            let (result, drained) = select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = tx.closed() => break,
                cycle = self.poll_cycle(after, query.limit, now, &mut window, &tx) => cycle,
            };

            let pruned = window.prune(Utc::now());
            if pruned > 0 {
                debug!("Forgot {} trades past retention", pruned);
            }

            {
                let mut s = stats.lock().await;
                s.emitted += drained.emitted;
                s.duplicates += drained.duplicates;
                match &result {
                    Ok(()) => {
                        s.successful_cycles += 1;
                        s.last_success = Some(Utc::now());
                    }
                    Err(e) => {
                        s.failed_cycles += 1;
                        s.last_error = Some(e.to_string());
                    }
                }
            }

            if drained.consumer_gone {
                debug!("Trade consumer went away");
                break;
            }

            match result {
                Ok(()) => {
                    debug!(
                        "Cycle done: {} received, {} new, {} tracked",
                        drained.received,
                        drained.emitted,
                        window.tracked()
                    );

                    if !caught_up {
                        caught_up = true;
                        query = self.config.steady;
                        info!(
                            "Caught up on {}, narrowing queries to {} minutes / {} trades",
                            pair_list(&self.pairs),
                            query.lookback.num_minutes(),
                            query.limit
                        );
                    }
                }
                Err(e) => match self.config.on_error {
                    TickErrorPolicy::Skip => {
                        warn!(
                            "Trade history cycle failed after {} new trades, skipping: {}",
                            drained.emitted, e
                        );
                    }
                    TickErrorPolicy::Stop => {
                        error!("Trade history cycle failed, stopping: {}", e);
                        break;
                    }
                },
            }
        }

        info!("Trade history poller for {} stopped", pair_list(&self.pairs));
    }

    /// Run one query while filtering and forwarding its trades as they arrive
    ///
    /// Trades forwarded before a failure stay emitted.
    async fn poll_cycle(
        &self,
        after: DateTime<Utc>,
        limit: usize,
        now: DateTime<Utc>,
        window: &mut DedupWindow,
        out: &mpsc::Sender<Trade>,
    ) -> (Result<(), ExchangeError>, Drained) {
        let (sink, incoming) = mpsc::channel(CYCLE_BUFFER);

        tokio::join!(
            self.exchange.trade_history(&self.pairs, after, limit, sink),
            Self::drain(incoming, now, window, out),
        )
    }

    async fn drain(
        mut incoming: mpsc::Receiver<Trade>,
        now: DateTime<Utc>,
        window: &mut DedupWindow,
        out: &mpsc::Sender<Trade>,
    ) -> Drained {
        let mut drained = Drained::default();

        while let Some(trade) = incoming.recv().await {
            drained.received += 1;

            if !window.observe(&trade, now) {
                drained.duplicates += 1;
                continue;
            }

            if out.send(trade).await.is_err() {
                drained.consumer_gone = true;
                break;
            }
            drained.emitted += 1;
        }

        drained
    }
}

fn pair_list(pairs: &[Pair]) -> String {
    pairs
        .iter()
        .map(Pair::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
