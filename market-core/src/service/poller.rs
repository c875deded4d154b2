use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio::{select, spawn};
use tracing::{debug, error, info, warn};

use super::feed::{emit, Delivery, FeedHandle};
use super::{FeedStats, PollerConfig, ServiceError, TickErrorPolicy};
use crate::exchange::Exchange;
use market_common::data::{MarketData, Pair};

/// Periodically fetches market data for one pair
pub struct MarketDataPoller {
    exchange: Arc<dyn Exchange>,
    pair: Pair,
    config: PollerConfig,
}

impl MarketDataPoller {
    pub fn new(exchange: Arc<dyn Exchange>, pair: Pair) -> Self {
        Self {
            exchange,
            pair,
            config: PollerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PollerConfig) -> Self {
        self.config = config;
        self
    }

    /// Fetch once, then keep fetching every `interval` in the background
    ///
    /// A failure of the first fetch is returned here and no task is started.
    /// The first snapshot is the first value on the returned handle.
    pub async fn start(self) -> Result<FeedHandle<MarketData>, ServiceError> {
        if self.config.interval.is_zero() {
            return Err(ServiceError::Validation(
                "Poll interval must be greater than zero".to_string(),
            ));
        }

        info!(
            "Starting market data poller for {} on {} every {:?}",
            self.pair,
            self.exchange.name(),
            self.config.interval
        );

        let first = self.exchange.market_data(&self.pair).await?;

        let stats = Arc::new(Mutex::new(FeedStats {
            successful_cycles: 1,
            last_success: Some(Utc::now()),
            ..FeedStats::default()
        }));

        let (tx, rx) = mpsc::channel(self.config.buffer.max(1));
        let (shutdown_tx, _) = broadcast::channel(1);
        let shutdown_rx = shutdown_tx.subscribe();

        let task = spawn(self.run(first, tx, shutdown_rx, Arc::clone(&stats)));

        Ok(FeedHandle::new(rx, shutdown_tx, task, stats))
    }

    async fn run(
        self,
        first: MarketData,
        tx: mpsc::Sender<MarketData>,
        mut shutdown_rx: broadcast::Receiver<()>,
        stats: Arc<Mutex<FeedStats>>,
    ) {
        let period = self.config.interval;

        if Self::forward(&tx, first, &mut shutdown_rx, &stats).await {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = tx.closed() => break,
                    _ = ticker.tick() => {}
                }

                let fetched = select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = tx.closed() => break,
                    fetched = self.exchange.market_data(&self.pair) => fetched,
                };

                match fetched {
                    Ok(data) => {
                        {
                            let mut s = stats.lock().await;
                            s.successful_cycles += 1;
                            s.last_success = Some(Utc::now());
                        }

                        if !Self::forward(&tx, data, &mut shutdown_rx, &stats).await {
                            break;
                        }
                    }
                    Err(e) => {
                        {
                            let mut s = stats.lock().await;
                            s.failed_cycles += 1;
                            s.last_error = Some(e.to_string());
                        }

                        match self.config.on_error {
                            TickErrorPolicy::Skip => {
                                warn!("Market data fetch for {} failed, skipping: {}", self.pair, e);
                            }
                            TickErrorPolicy::Stop => {
                                error!("Market data fetch for {} failed, stopping: {}", self.pair, e);
                                break;
                            }
                        }
                    }
                }
            }
        }

        info!("Market data poller for {} stopped", self.pair);
    }

    /// Hand one snapshot to the consumer; false once the feed should end
    async fn forward(
        tx: &mpsc::Sender<MarketData>,
        data: MarketData,
        shutdown_rx: &mut broadcast::Receiver<()>,
        stats: &Arc<Mutex<FeedStats>>,
    ) -> bool {
        match emit(tx, data, shutdown_rx).await {
            Delivery::Sent => {
                stats.lock().await.emitted += 1;
                true
            }
            Delivery::Closed => {
                debug!("Market data consumer went away");
                false
            }
            Delivery::Stopped => false,
        }
    }
}
