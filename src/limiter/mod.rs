//! Rate limiter state for tracking per-key request budgets
//!
//! This module provides the token buckets that pace requests and the registry
//! that owns them.
//!
//! # Components
//!
//! - `RateLimiterState`: Fractional token bucket plus backoff for one key
//! - `LimiterRegistry`: Lazily creates and owns one bucket per rate-limit key
//! - `KeyStrategy`: Whether keys are full URLs or hosts

mod bucket;
mod registry;

// Re-export main types
pub use bucket::{LimiterSnapshot, RateLimiterState, BASE_BACKOFF, MAX_BACKOFF, MIN_RATE};
pub use registry::{KeyStrategy, LimiterRegistry, SharedState};

pub(crate) use registry::lock;
