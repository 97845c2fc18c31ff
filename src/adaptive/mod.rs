//! Adaptive control of per-key request rates
//!
//! This module turns HTTP responses into rate and backoff adjustments:
//! - Transport failures halve the rate
//! - HTTP 429 drains the bucket, cuts the rate by a quarter and grows the backoff
//! - `X-RateLimit-*` / `RateLimit-*` headers steer the rate toward 80% of the
//!   advertised quota
//! - Quiet successes reset the backoff and slowly recover bandwidth

mod controller;
pub mod headers;

pub use controller::{AdaptiveController, Verdict};
pub use headers::{parse_retry_after, RateLimitHeaders};
