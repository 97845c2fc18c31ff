//! Statistics generation from the limiter registry
//!
//! This module provides functionality for extracting and displaying what the
//! fetcher has learned about each rate-limit key.

use crate::limiter::{LimiterRegistry, LimiterSnapshot};

/// Limiter statistics summary
#[derive(Debug, Clone)]
pub struct LimiterStatistics {
    /// Snapshot of every tracked key, sorted by key
    pub keys: Vec<(String, LimiterSnapshot)>,

    /// Tokens handed out across all keys
    pub total_requests: u64,

    /// 429 responses observed across all keys
    pub throttle_hits: u64,
}

impl LimiterStatistics {
    /// Keys that have been throttled at least once
    pub fn throttled_keys(&self) -> impl Iterator<Item = &str> {
        self.keys
            .iter()
            .filter(|(_, snapshot)| snapshot.throttle_hits > 0)
            .map(|(key, _)| key.as_str())
    }
}

/// Collects statistics from a registry
///
/// # Arguments
///
/// * `registry` - The registry to snapshot
///
/// # Returns
///
/// Statistics over every key the registry currently tracks
pub fn collect_statistics(registry: &LimiterRegistry) -> LimiterStatistics {
    let keys = registry.snapshots();
    let total_requests = keys.iter().map(|(_, s)| s.total_requests).sum();
    let throttle_hits = keys.iter().map(|(_, s)| s.throttle_hits).sum();

    LimiterStatistics {
        keys,
        total_requests,
        throttle_hits,
    }
}

/// Formats statistics as a plain-text table
pub fn format_statistics(stats: &LimiterStatistics) -> String {
    let mut out = String::new();

    out.push_str("=== Rate Limiter Statistics ===\n\n");
    out.push_str(&format!("Tracked keys: {}\n", stats.keys.len()));
    out.push_str(&format!("Requests issued: {}\n", stats.total_requests));
    out.push_str(&format!("Throttle responses: {}\n\n", stats.throttle_hits));

    if stats.keys.is_empty() {
        return out;
    }

    let width = stats
        .keys
        .iter()
        .map(|(key, _)| key.len())
        .max()
        .unwrap_or(0)
        .max("Key".len());

    out.push_str(&format!(
        "{:<width$}  {:>10}  {:>8}  {:>8}  {:>8}  {:>6}\n",
        "Key",
        "Rate/s",
        "Tokens",
        "Backoff",
        "Requests",
        "429s",
        width = width
    ));

    for (key, snapshot) in &stats.keys {
        out.push_str(&format!(
            "{:<width$}  {:>10.3}  {:>8.2}  {:>7}s  {:>8}  {:>6}\n",
            key,
            snapshot.rate_per_sec,
            snapshot.tokens,
            snapshot.backoff.as_secs(),
            snapshot.total_requests,
            snapshot.throttle_hits,
            width = width
        ));
    }

    out
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &LimiterStatistics) {
    print!("{}", format_statistics(stats));
}
