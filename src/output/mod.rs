//! Output module for batch summaries and limiter reports
//!
//! This module handles:
//! - Summarizing per-URL batch results
//! - Recording and displaying what the limiter learned per key

pub mod stats;
mod summary;

pub use stats::{collect_statistics, format_statistics, print_statistics, LimiterStatistics};
pub use summary::{format_summary, print_summary, BatchSummary, EntryStatus, SummaryEntry};
