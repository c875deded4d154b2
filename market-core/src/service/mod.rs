pub mod dedup;
pub mod errors;
pub mod feed;
pub mod poller;
pub mod trade_history;
pub mod types;

// Re-export main interfaces
pub use dedup::DedupWindow;
pub use errors::ServiceError;
pub use feed::FeedHandle;
pub use poller::MarketDataPoller;
pub use trade_history::TradeHistoryPoller;
pub use types::*;
