// exchange/mod.rs
pub mod traits;
pub mod types;
pub mod errors;
pub mod http;
pub mod btce;
pub mod bitcoincharts;
pub mod registry;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main interfaces for easy access
pub use traits::Exchange;
pub use types::*;
pub use errors::ExchangeError;
pub use http::{HttpClient, HttpConfig};
pub use btce::{BtceConfig, BtceExchange};
pub use bitcoincharts::{BitcoinchartsConfig, BitcoinchartsExchange};
pub use registry::{ExchangeKey, ExchangeRegistry};
