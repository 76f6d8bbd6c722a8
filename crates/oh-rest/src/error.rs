//! REST errors

use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by the REST client
#[derive(Debug, Error)]
pub enum RestError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request to {url} failed: {status}")]
    RequestFailed { url: String, status: StatusCode },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RestError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RestError::NotFound(_))
    }
}

/// Result type for REST operations
pub type RestResult<T> = Result<T, RestError>;
