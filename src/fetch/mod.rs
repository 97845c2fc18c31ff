//! HTTP fetching under adaptive rate limits
//!
//! This module handles:
//! - Building the shared HTTP client
//! - Per-request options (API key, headers, query parameters)
//! - Single rate-limited fetches with 429 retry
//! - Concurrent batch dispatch

mod batch;
mod client;
mod fetcher;
mod options;

pub use batch::{BatchDispatcher, BatchOutcome};
pub use client::build_http_client;
pub use fetcher::Fetcher;
pub use options::{RequestOptions, API_KEY_HEADER};
