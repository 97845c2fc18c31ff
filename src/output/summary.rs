//! Batch summary generation
//!
//! Turns a [`BatchOutcome`] into a per-URL report in the order the URLs were
//! requested.

use crate::fetch::BatchOutcome;
use std::collections::HashSet;
use std::time::Duration;

/// Result of one URL in a batch summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    /// Fetched successfully, with the body size in bytes
    Fetched(usize),

    /// Failed, with the error message
    Failed(String),

    /// The batch finished without a result for this URL
    Missing,
}

/// One line of a batch summary
#[derive(Debug, Clone)]
pub struct SummaryEntry {
    pub url: String,
    pub status: EntryStatus,
}

/// Summary of a completed batch
#[derive(Debug, Clone)]
pub struct BatchSummary {
    /// Hash of the configuration the batch ran under
    pub config_hash: String,

    /// Wall-clock time the batch took
    pub duration: Duration,

    /// One entry per distinct URL, in request order
    pub entries: Vec<SummaryEntry>,
}

impl BatchSummary {
    /// Builds a summary from the requested URLs and the batch outcome
    ///
    /// Duplicate URLs appear once, at their first position.
    pub fn from_outcome(
        urls: &[String],
        outcome: &BatchOutcome,
        duration: Duration,
        config_hash: &str,
    ) -> Self {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for url in urls {
            if !seen.insert(url.as_str()) {
                continue;
            }
            let status = if let Some(body) = outcome.successes.get(url) {
                EntryStatus::Fetched(body.len())
            } else if let Some(err) = outcome.failures.get(url) {
                EntryStatus::Failed(err.to_string())
            } else {
                EntryStatus::Missing
            };
            entries.push(SummaryEntry {
                url: url.clone(),
                status,
            });
        }

        Self {
            config_hash: config_hash.to_string(),
            duration,
            entries,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, EntryStatus::Fetched(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }

    /// Percentage of URLs fetched successfully
    pub fn success_rate(&self) -> f64 {
        if self.entries.is_empty() {
            0.0
        } else {
            (self.succeeded() as f64 / self.entries.len() as f64) * 100.0
        }
    }
}

/// Formats a batch summary as plain text
pub fn format_summary(summary: &BatchSummary) -> String {
    let mut out = String::new();

    out.push_str("=== Batch Summary ===\n\n");
    out.push_str(&format!("Config hash: {}\n", summary.config_hash));
    out.push_str(&format!(
        "Duration: {:.2}s\n",
        summary.duration.as_secs_f64()
    ));
    out.push_str(&format!(
        "Succeeded: {} / {} ({:.1}%)\n\n",
        summary.succeeded(),
        summary.entries.len(),
        summary.success_rate()
    ));

    for entry in &summary.entries {
        match &entry.status {
            EntryStatus::Fetched(bytes) => {
                out.push_str(&format!("  OK    {} ({} bytes)\n", entry.url, bytes))
            }
            EntryStatus::Failed(error) => {
                out.push_str(&format!("  FAIL  {}: {}\n", entry.url, error))
            }
            EntryStatus::Missing => out.push_str(&format!("  ???   {}\n", entry.url)),
        }
    }
    out.push('\n');

    out
}

/// Prints a batch summary to stdout
pub fn print_summary(summary: &BatchSummary) {
    print!("{}", format_summary(summary));
}
