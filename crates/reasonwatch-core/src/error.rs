//! Error types for the fetch boundary

use thiserror::Error;

/// Errors crossing the fetch boundary
///
/// Cloneable so a single transport failure can be delivered to both halves
/// of a duplicated body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The request could not be sent or no response arrived
    #[error("request failed: {0}")]
    Request(String),

    /// The response body failed mid-stream
    #[error("transport error: {0}")]
    Transport(String),

    /// A header name or value could not be represented
    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_body() || err.is_decode() {
            FetchError::Transport(err.to_string())
        } else {
            FetchError::Request(err.to_string())
        }
    }
}
