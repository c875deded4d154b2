use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use market_common::data::Trade;

/// Remembers which trades were already emitted
///
/// Each identity maps to the time it was last seen. An identity not seen
/// for longer than the retention period counts as new again.
#[derive(Debug)]
pub struct DedupWindow {
    seen: HashMap<String, DateTime<Utc>>,
    retention: Duration,
}

impl DedupWindow {
    pub fn new(retention: Duration) -> Self {
        Self {
            seen: HashMap::new(),
            retention,
        }
    }

    /// Record a sighting of `trade` at `now`
    ///
    /// Returns `true` if the trade should be emitted.
    pub fn observe(&mut self, trade: &Trade, now: DateTime<Utc>) -> bool {
        let horizon = now - self.retention;
        match self.seen.insert(trade.identity(), now) {
            None => true,
            Some(last_seen) => last_seen < horizon,
        }
    }

    /// Forget identities last seen before `now - retention`
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let horizon = now - self.retention;
        let before = self.seen.len();
        self.seen.retain(|_, last_seen| *last_seen >= horizon);
        before - self.seen.len()
    }

    /// Number of identities currently remembered
    pub fn tracked(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_common::data::TradeSide;
    use rust_decimal_macros::dec;

    fn trade(exchange: &str, id: &str) -> Trade {
        Trade {
            id: id.to_string(),
            pair: "btc_usd".parse().unwrap(),
            amount: dec!(0.5),
            rate: dec!(612),
            timestamp: Utc::now(),
            side: TradeSide::Buy,
            exchange: exchange.to_string(),
        }
    }

    #[test]
    fn test_repeat_within_retention_is_suppressed() {
        let mut window = DedupWindow::new(Duration::hours(60));
        let t0 = Utc::now();

        assert!(window.observe(&trade("btce", "1"), t0));
        assert!(!window.observe(&trade("btce", "1"), t0 + Duration::minutes(1)));
        assert!(!window.observe(&trade("btce", "1"), t0 + Duration::hours(59)));
        assert_eq!(window.tracked(), 1);
    }

    #[test]
    fn test_identity_includes_exchange() {
        let mut window = DedupWindow::new(Duration::hours(60));
        let now = Utc::now();

        assert!(window.observe(&trade("btce", "1"), now));
        assert!(window.observe(&trade("bitcoincharts:bitstamp", "1"), now));
        assert_eq!(window.tracked(), 2);
    }

    #[test]
    fn test_repeat_after_retention_is_new() {
        let mut window = DedupWindow::new(Duration::hours(60));
        let t0 = Utc::now();

        assert!(window.observe(&trade("btce", "1"), t0));
        assert!(window.observe(&trade("btce", "1"), t0 + Duration::hours(61)));
    }

    #[test]
    fn test_sighting_refreshes_entry() {
        let mut window = DedupWindow::new(Duration::hours(60));
        let t0 = Utc::now();

        window.observe(&trade("btce", "1"), t0);
        window.observe(&trade("btce", "1"), t0 + Duration::hours(30));

        assert!(!window.observe(&trade("btce", "1"), t0 + Duration::hours(70)));
    }

    #[test]
    fn test_prune_drops_only_expired() {
        let mut window = DedupWindow::new(Duration::hours(60));
        let t0 = Utc::now();

        window.observe(&trade("btce", "old"), t0);
        window.observe(&trade("btce", "new"), t0 + Duration::hours(10));

        assert_eq!(window.prune(t0 + Duration::hours(65)), 1);
        assert_eq!(window.tracked(), 1);
        assert_eq!(window.prune(t0 + Duration::hours(65)), 0);

        let later = t0 + Duration::hours(66);
        assert!(!window.observe(&trade("btce", "new"), later));
        assert!(window.observe(&trade("btce", "old"), later));
    }
}
