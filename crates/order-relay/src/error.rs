//! # Application Errors

use delivery_framework::{BrokerError, RequestError};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Task failed to complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}
