use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// How a running feed reacts to a failed cycle after the first one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickErrorPolicy {
    /// Log a warning, count the failure and poll again on the next tick
    #[default]
    Skip,
    /// Log the error and end the feed
    Stop,
}

/// Market data poller configuration
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between fetches
    pub interval: Duration,
    /// Capacity of the output channel
    pub buffer: usize,
    pub on_error: TickErrorPolicy,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            buffer: 1,
            on_error: TickErrorPolicy::Skip,
        }
    }
}

/// How far back a trade-history query reaches and how many trades it asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub lookback: chrono::Duration,
    pub limit: usize,
}

/// Trade-history poller configuration
#[derive(Debug, Clone)]
pub struct TradeHistoryConfig {
    /// Time between cycles
    pub interval: Duration,
    /// Window of the first, catch-up query
    pub initial: QueryWindow,
    /// Window used once the first cycle succeeded
    pub steady: QueryWindow,
    /// How long a trade identity is remembered after it was last seen
    pub retention: chrono::Duration,
    /// Capacity of the output channel
    pub buffer: usize,
    pub on_error: TickErrorPolicy,
}

impl Default for TradeHistoryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            initial: QueryWindow {
                lookback: chrono::Duration::days(3),
                limit: 2000,
            },
            steady: QueryWindow {
                lookback: chrono::Duration::minutes(15),
                limit: 100,
            },
            retention: chrono::Duration::hours(60),
            buffer: 64,
            on_error: TickErrorPolicy::Skip,
        }
    }
}

/// Counters kept by a running feed
#[derive(Debug, Clone, Default)]
pub struct FeedStats {
    /// Fetches that completed without error
    pub successful_cycles: u64,
    /// Fetches that failed
    pub failed_cycles: u64,
    /// Values delivered to the output channel
    pub emitted: u64,
    /// Trades dropped as already seen
    pub duplicates: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
