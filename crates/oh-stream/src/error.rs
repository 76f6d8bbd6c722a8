//! Stream ingestion errors

use thiserror::Error;

/// Errors raised while connecting to or reading the event stream
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("event stream read failed: {0}")]
    Read(#[source] reqwest::Error),
}

/// Result type for stream operations
pub type StreamResult<T> = Result<T, StreamError>;
