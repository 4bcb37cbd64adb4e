use std::time::Duration;
use thiserror::Error;

// Errors a caller can see. Everything downstream of a well-formed request
// resolves to an AnalysisResult instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("too many items: {count} exceeds the limit of {limit}")]
    TooManyItems { count: usize, limit: usize },
}

impl AnalysisError {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::InvalidRequest(_) => "invalid_request",
            AnalysisError::TooManyItems { .. } => "too_many_items",
        }
    }
}

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            UpstreamError::Status(status.as_u16())
        } else if err.is_decode() {
            UpstreamError::Malformed(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache operation timed out")]
    Timeout,

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}
