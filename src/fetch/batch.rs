//! Concurrent batch dispatch
//!
//! Every URL in a batch gets its own task. All tasks go through the same
//! [`Fetcher`], so they share one limiter registry and pace each other on
//! common keys.

use crate::fetch::fetcher::Fetcher;
use crate::fetch::options::RequestOptions;
use crate::{FetchError, FetchResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Per-URL results of a batch
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Response bodies of the URLs that were fetched successfully
    pub successes: HashMap<String, Vec<u8>>,

    /// Errors of the URLs that could not be fetched
    pub failures: HashMap<String, FetchError>,
}

impl BatchOutcome {
    /// Records the result of one task
    ///
    /// A URL listed more than once counts as fetched if any of its tasks
    /// succeeded.
    fn record(&mut self, url: String, result: FetchResult<Vec<u8>>) {
        match result {
            Ok(body) => {
                self.failures.remove(&url);
                self.successes.insert(url, body);
            }
            Err(err) => {
                if !self.successes.contains_key(&url) {
                    self.failures.insert(url, err);
                }
            }
        }
    }

    /// Total number of distinct URLs in the outcome
    pub fn len(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successes.is_empty() && self.failures.is_empty()
    }
}

/// Fans fetches out over many URLs
#[derive(Debug, Clone)]
pub struct BatchDispatcher {
    fetcher: Fetcher,
    in_flight: Option<Arc<Semaphore>>,
}

impl BatchDispatcher {
    /// Creates a dispatcher that starts every URL at once
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            in_flight: None,
        }
    }

    /// Caps how many fetches run at the same time (0 = uncapped)
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.in_flight = (max_in_flight > 0).then(|| Arc::new(Semaphore::new(max_in_flight)));
        self
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Fetches every URL concurrently and returns the bodies that succeeded
    ///
    /// Failed URLs are left out of the map; the batch itself never fails.
    ///
    /// # Arguments
    ///
    /// * `urls` - Endpoints to fetch; duplicates are fetched once per occurrence
    /// * `api_key` - Sent as `X-API-KEY` on every request when non-empty
    /// * `initial_rps` - Starting rate for keys not seen before
    /// * `cancel` - Stops all outstanding fetches when cancelled
    pub async fn fetch_batch(
        &self,
        urls: &[String],
        api_key: Option<&str>,
        initial_rps: f64,
        cancel: &CancellationToken,
    ) -> HashMap<String, Vec<u8>> {
        self.fetch_batch_detailed(urls, api_key, initial_rps, cancel)
            .await
            .successes
    }

    /// Like [`fetch_batch`](Self::fetch_batch), but also reports why each
    /// failed URL failed
    pub async fn fetch_batch_detailed(
        &self,
        urls: &[String],
        api_key: Option<&str>,
        initial_rps: f64,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let options = RequestOptions::new().api_key(api_key.unwrap_or_default());
        self.fetch_batch_with(urls, options, initial_rps, cancel).await
    }

    /// Fetches every URL concurrently with the same request options
    pub async fn fetch_batch_with(
        &self,
        urls: &[String],
        options: RequestOptions,
        initial_rps: f64,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        tracing::info!("Dispatching batch of {} URLs", urls.len());

        let options = Arc::new(options);
        let mut tasks = JoinSet::new();

        for url in urls {
            let url = url.clone();
            let fetcher = self.fetcher.clone();
            let options = Arc::clone(&options);
            let in_flight = self.in_flight.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let _permit = match in_flight {
                    Some(semaphore) => {
                        let acquired = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            permit = semaphore.acquire_owned() => permit.ok(),
                        };
                        match acquired {
                            Some(permit) => Some(permit),
                            None => {
                                let err = FetchError::Cancelled { url: url.clone() };
                                return (url, Err(err));
                            }
                        }
                    }
                    None => None,
                };

                let result = fetcher
                    .fetch_with(&url, &options, initial_rps, &cancel)
                    .await;
                (url, result)
            });
        }

        let mut outcome = BatchOutcome::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((url, result)) => {
                    if let Err(e) = &result {
                        tracing::debug!("Batch fetch failed: {}", e);
                    }
                    outcome.record(url, result);
                }
                Err(e) => tracing::error!("Batch task failed to complete: {}", e),
            }
        }

        tracing::info!(
            "Batch complete: {} succeeded, {} failed",
            outcome.successes.len(),
            outcome.failures.len()
        );
        outcome
    }
}
