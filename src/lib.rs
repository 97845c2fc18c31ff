//! Sumi-Fetch: an adaptive, rate-limited HTTP fetch layer
//!
//! This crate issues GET requests against external APIs while discovering and
//! respecting each endpoint's rate limit. Every rate-limit key owns a
//! fractional token bucket whose rate is steered by the responses it sees
//! (HTTP 429, `Retry-After`, `X-RateLimit-*` headers), and a batch dispatcher
//! fans requests out over many URLs concurrently.

pub mod adaptive;
pub mod config;
pub mod fetch;
pub mod limiter;
pub mod output;

use thiserror::Error;

/// Error returned by a single logical fetch
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        source: ::url::ParseError,
    },

    #[error("HTTP transport error for {url}: {source}")]
    Transport { url: String, source: reqwest::Error },

    #[error("Still throttled by {url} after {attempts} attempts")]
    Throttled { url: String, attempts: u32 },

    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Empty response body from {url}")]
    EmptyBody { url: String },

    #[error("Response from {url} exceeded {limit} bytes")]
    ResponseTooLarge { url: String, limit: usize },

    #[error("Fetch of {url} was cancelled")]
    Cancelled { url: String },
}

impl FetchError {
    /// The URL the failed fetch was issued against
    pub fn url(&self) -> &str {
        match self {
            FetchError::InvalidUrl { url, .. }
            | FetchError::Transport { url, .. }
            | FetchError::Throttled { url, .. }
            | FetchError::UnexpectedStatus { url, .. }
            | FetchError::EmptyBody { url }
            | FetchError::ResponseTooLarge { url, .. }
            | FetchError::Cancelled { url } => url,
        }
    }

    /// Whether the error came from the caller's cancellation signal
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled { .. })
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for fetch operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use adaptive::AdaptiveController;
pub use config::Config;
pub use fetch::{BatchDispatcher, BatchOutcome, Fetcher, RequestOptions};
pub use limiter::{KeyStrategy, LimiterRegistry, RateLimiterState};
