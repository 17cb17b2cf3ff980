use std::time::Duration;
use thiserror::Error;

use crate::rate_limiter::RateClass;

/// Every failure the client can surface.
///
/// Matching on `Error` covers all of them; the variants narrow the cause.
#[derive(Debug, Error)]
pub enum Error {
    #[error("request timeout")]
    Timeout,

    #[error("request failed: {0}")]
    Request(String),

    #[error("request failed with HTTP status {status}")]
    Status { status: u16 },

    /// Provider answered `"status": "fail"` with this message.
    #[error("{0}")]
    Api(String),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid IP: {0}")]
    InvalidIp(String),

    #[error("batch limit exceeded: {count} items (max {max})")]
    BatchLimit { count: usize, max: usize },

    #[error("batch request validation failed (>100 items or invalid format)")]
    BatchValidation,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("client is closed")]
    Closed,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Rate limit failures, raised either locally or by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// The local sliding window is full; nothing was sent.
    #[error("rate limit exceeded: {limit} {class} requests per {} seconds", window.as_secs())]
    Local {
        class: RateClass,
        limit: usize,
        window: Duration,
    },

    /// HTTP 429 from the provider.
    #[error("{}", server_message(*seconds_until_reset))]
    Server { seconds_until_reset: Option<u64> },
}

fn server_message(seconds_until_reset: Option<u64>) -> String {
    match seconds_until_reset {
        Some(ttl) => format!("rate limit exceeded, reset in {} seconds", ttl),
        None => "rate limit exceeded".to_string(),
    }
}

impl Error {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Error::RateLimit(_))
    }

    /// Seconds until the provider resets its window, when a 429 reported it.
    pub fn seconds_until_reset(&self) -> Option<u64> {
        match self {
            Error::RateLimit(RateLimitError::Server { seconds_until_reset }) => *seconds_until_reset,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            // the URL carries the API key on the pro tier
            Error::Request(err.without_url().to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
