//! Parsing of throttling and quota response headers
//!
//! The `X-RateLimit-*` family is not standardised; there is an
//! [IETF draft](https://datatracker.ietf.org/doc/draft-ietf-httpapi-ratelimit-headers/)
//! that drops the `X-` prefix, so both spellings are checked, prefixed first.

use reqwest::header::{HeaderMap, HeaderValue};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub const RETRY_AFTER: &str = "retry-after";

const LIMIT_HEADERS: [&str; 2] = ["x-ratelimit-limit", "ratelimit-limit"];
const REMAINING_HEADERS: [&str; 2] = ["x-ratelimit-remaining", "ratelimit-remaining"];
const RESET_HEADERS: [&str; 2] = ["x-ratelimit-reset", "ratelimit-reset"];

/// Reset values above this are Unix timestamps rather than window lengths
const EPOCH_THRESHOLD: f64 = 1_000_000_000.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryAfterParseError {
    #[error("Unable to parse value '{0}'")]
    ValueError(String),

    #[error("Header value contains invalid chars")]
    HeaderValueError,
}

/// Parse the "Retry-After" header as specified per
/// [RFC 7231 section 7.1.3](https://www.rfc-editor.org/rfc/rfc7231#section-7.1.3)
pub fn parse_retry_after(value: &HeaderValue) -> Result<Duration, RetryAfterParseError> {
    let value = value
        .to_str()
        .map_err(|_| RetryAfterParseError::HeaderValueError)?
        .trim();

    // Retry-After = HTTP-date / delay-seconds
    value.parse::<u64>().map(Duration::from_secs).or_else(|_| {
        httpdate::parse_http_date(value)
            .map(|at| {
                at.duration_since(SystemTime::now())
                    // a date in the past means "now"
                    .unwrap_or(Duration::ZERO)
            })
            .map_err(|_| RetryAfterParseError::ValueError(value.into()))
    })
}

/// Reads `Retry-After` from a header map, ignoring malformed values
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?;
    match parse_retry_after(value) {
        Ok(delay) => Some(delay),
        Err(e) => {
            tracing::debug!("Ignoring Retry-After header: {}", e);
            None
        }
    }
}

/// Quota signals advertised by a response
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateLimitHeaders {
    /// Requests allowed per window
    pub limit: Option<f64>,

    /// Requests left in the current window
    pub remaining: Option<f64>,

    /// Seconds until the window resets
    pub reset: Option<f64>,
}

impl RateLimitHeaders {
    /// Extracts quota headers, resolving epoch-style resets against the wall clock
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self::from_headers_at(headers, SystemTime::now())
    }

    /// Extracts quota headers, resolving epoch-style resets against `now`
    pub fn from_headers_at(headers: &HeaderMap, now: SystemTime) -> Self {
        let reset = parse_header_value(headers, &RESET_HEADERS).and_then(|reset| {
            if reset < EPOCH_THRESHOLD {
                return Some(reset);
            }
            let now = now.duration_since(UNIX_EPOCH).ok()?.as_secs_f64();
            let remaining = reset - now;
            (remaining > 0.0).then_some(remaining)
        });

        Self {
            limit: parse_header_value(headers, &LIMIT_HEADERS),
            remaining: parse_header_value(headers, &REMAINING_HEADERS),
            reset,
        }
    }

    /// Whether the response carried no usable quota signal
    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.remaining.is_none() && self.reset.is_none()
    }

    /// The rate the server advertises, `limit / reset`, when both are present
    pub fn advertised_rate(&self) -> Option<f64> {
        match (self.limit, self.reset) {
            (Some(limit), Some(reset)) if reset > 0.0 => Some(limit / reset),
            _ => None,
        }
    }
}

/// Returns the first header in `header_names` holding a non-negative number
fn parse_header_value(headers: &HeaderMap, header_names: &[&str]) -> Option<f64> {
    header_names.iter().find_map(|name| {
        let value = headers.get(*name)?.to_str().ok()?;
        let number = value.trim().parse::<f64>().ok()?;
        (number.is_finite() && number >= 0.0).then_some(number)
    })
}
