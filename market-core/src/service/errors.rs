use thiserror::Error;
use crate::exchange::ExchangeError;

/// Service layer error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task error: {0}")]
    Task(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ServiceError {
    /// Check if retrying the same call later may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            ServiceError::Exchange(e) => {
                e.is_transient() || matches!(e, ExchangeError::RateLimit(_))
            }
            ServiceError::Task(_) => true,
            ServiceError::Config(_) => false,
            ServiceError::Validation(_) => false,
        }
    }
}
