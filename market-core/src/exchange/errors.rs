// =================================================================
// exchange/errors.rs - Error Types
// =================================================================

use market_common::data::DataError;
use thiserror::Error;

/// Error types for exchange operations
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Data parsing error: {0}")]
    ParseError(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Exchange API error: {0}")]
    ApiError(String),

    #[error("Operation not supported by {exchange}: {operation}")]
    NotSupported {
        exchange: String,
        operation: &'static str,
    },

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("No driver registered for {0}")]
    UnknownExchange(String),

    #[error("Trade sink closed")]
    SinkClosed,

    #[error("IO error: {0}")]
    Io(String),
}

impl ExchangeError {
    pub fn not_supported(exchange: &str, operation: &'static str) -> Self {
        ExchangeError::NotSupported {
            exchange: exchange.to_string(),
            operation,
        }
    }

    /// Transport-level failures worth another attempt
    pub fn is_transient(&self) -> bool {
        match self {
            ExchangeError::NetworkError(_) | ExchangeError::Timeout => true,
            ExchangeError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

// Convert from common error types
impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::ParseError(err.to_string())
    }
}

impl From<csv::Error> for ExchangeError {
    fn from(err: csv::Error) -> Self {
        ExchangeError::ParseError(err.to_string())
    }
}

impl From<std::io::Error> for ExchangeError {
    fn from(err: std::io::Error) -> Self {
        ExchangeError::Io(err.to_string())
    }
}

impl From<DataError> for ExchangeError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::InvalidSymbol(s) | DataError::InvalidPair(s) => {
                ExchangeError::InvalidSymbol(s)
            }
            other => ExchangeError::ParseError(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout
        } else if err.is_connect() || err.is_request() {
            ExchangeError::NetworkError(err.to_string())
        } else if err.is_decode() {
            ExchangeError::ParseError(err.to_string())
        } else {
            ExchangeError::ApiError(err.to_string())
        }
    }
}
