//! Client errors

use oh_automation::RuleError;
use oh_config::ConfigError;
use oh_rest::RestError;
use oh_stream::StreamError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("event stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("REST error: {0}")]
    Rest(#[from] RestError),

    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
