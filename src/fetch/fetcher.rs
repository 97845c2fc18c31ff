//! Rate-limited HTTP fetcher
//!
//! This module executes single logical GET requests, including:
//! - Acquiring a token from the endpoint's bucket, waiting if needed
//! - Sending the request with optional API key and headers
//! - Feeding the response through the adaptive controller
//! - Retrying after the backoff when the endpoint answers 429
//! - Reading the body under a size limit
//!
//! # Error Handling
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 200, non-empty body | Return body |
//! | HTTP 200, empty body | `EmptyBody`, no adjustment |
//! | HTTP 429 | Back off, retry up to `max-attempts` |
//! | Other status | `UnexpectedStatus`, no retry |
//! | Connect / read failure | Halve rate, `Transport`, no retry |
//! | Cancellation | `Cancelled` from whichever wait was in progress |

use crate::adaptive::{AdaptiveController, RateLimitHeaders, Verdict};
use crate::config::{Config, FetcherConfig};
use crate::fetch::client::build_http_client;
use crate::fetch::options::RequestOptions;
use crate::limiter::{lock, LimiterRegistry, SharedState};
use crate::{FetchError, FetchResult};
use reqwest::{Client, Response};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Issues rate-limited GET requests
///
/// A `Fetcher` owns the limiter registry, so everything it learns about an
/// endpoint carries over to later calls. Clones share the same registry and
/// connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    registry: Arc<LimiterRegistry>,
    controller: AdaptiveController,
    max_attempts: u32,
    max_response_bytes: usize,
}

impl Fetcher {
    /// Builds a fetcher with its own HTTP client and registry from configuration
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config.user_agent, &config.fetcher)?;
        let capacity =
            NonZeroUsize::new(config.fetcher.max_tracked_keys).unwrap_or(NonZeroUsize::MIN);
        let registry = Arc::new(LimiterRegistry::new(config.fetcher.key_strategy, capacity));
        Ok(Self::with_parts(client, registry, &config.fetcher))
    }

    /// Builds a fetcher around an existing client and registry
    pub fn with_parts(
        client: Client,
        registry: Arc<LimiterRegistry>,
        settings: &FetcherConfig,
    ) -> Self {
        Self {
            client,
            registry,
            controller: AdaptiveController::new(),
            max_attempts: settings.max_attempts,
            max_response_bytes: settings.max_response_bytes,
        }
    }

    /// The registry holding this fetcher's per-key buckets
    pub fn registry(&self) -> &Arc<LimiterRegistry> {
        &self.registry
    }

    /// Fetches `endpoint`, sending `X-API-KEY` when a non-empty key is given
    ///
    /// `initial_rps` seeds the bucket only if the endpoint's key has not been
    /// seen yet; a known key keeps the rate it has learned.
    pub async fn fetch_one(
        &self,
        endpoint: &str,
        api_key: Option<&str>,
        initial_rps: f64,
        cancel: &CancellationToken,
    ) -> FetchResult<Vec<u8>> {
        let options = RequestOptions::new().api_key(api_key.unwrap_or_default());
        self.fetch_with(endpoint, &options, initial_rps, cancel).await
    }

    /// Fetches `endpoint` with arbitrary request options
    pub async fn fetch_with(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        initial_rps: f64,
        cancel: &CancellationToken,
    ) -> FetchResult<Vec<u8>> {
        let url = Url::parse(endpoint).map_err(|source| FetchError::InvalidUrl {
            url: endpoint.to_string(),
            source,
        })?;
        let key = self.registry.key_for(&url);
        let state = self.registry.get_or_create(&key, initial_rps);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.acquire_token(&key, &state, endpoint, cancel).await?;

            tracing::debug!("GET {} (attempt {})", endpoint, attempt);
            let request = options.apply(self.client.get(url.clone()));
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(endpoint)),
                sent = request.send() => sent,
            };

            let response = match sent {
                Ok(response) => response,
                Err(source) => {
                    self.controller.on_transport_failure(&key, &mut lock(&state));
                    tracing::warn!("Request to {} failed: {}", endpoint, source);
                    return Err(FetchError::Transport {
                        url: endpoint.to_string(),
                        source,
                    });
                }
            };

            let verdict = {
                let mut guard = lock(&state);
                self.controller
                    .classify(&key, &mut guard, response.status(), response.headers())
            };

            match verdict {
                Verdict::Deliver => {
                    return self.read_body(&key, &state, endpoint, response, cancel).await;
                }
                Verdict::Reject { status } => {
                    tracing::debug!("{} answered HTTP {}", endpoint, status);
                    return Err(FetchError::UnexpectedStatus {
                        url: endpoint.to_string(),
                        status,
                    });
                }
                Verdict::Retry { backoff } => {
                    if self.max_attempts != 0 && attempt >= self.max_attempts {
                        tracing::warn!(
                            "Giving up on {} after {} throttled attempts",
                            endpoint,
                            attempt
                        );
                        return Err(FetchError::Throttled {
                            url: endpoint.to_string(),
                            attempts: attempt,
                        });
                    }
                    pause(backoff, endpoint, cancel).await?;
                }
            }
        }
    }

    /// Waits until the bucket hands out a token
    async fn acquire_token(
        &self,
        key: &str,
        state: &SharedState,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> FetchResult<()> {
        loop {
            let acquired = lock(state).acquire(Instant::now());
            match acquired {
                Ok(()) => return Ok(()),
                Err(wait) => {
                    tracing::trace!("Rate limiting {}: waiting {:?}", key, wait);
                    pause(wait, endpoint, cancel).await?;
                }
            }
        }
    }

    /// Reads a 200 response body, reporting the outcome to the controller
    async fn read_body(
        &self,
        key: &str,
        state: &SharedState,
        endpoint: &str,
        mut response: Response,
        cancel: &CancellationToken,
    ) -> FetchResult<Vec<u8>> {
        if response.content_length() == Some(0) {
            return Err(FetchError::EmptyBody {
                url: endpoint.to_string(),
            });
        }

        let limits = RateLimitHeaders::from_headers(response.headers());
        let mut body = Vec::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(endpoint)),
                chunk = response.chunk() => chunk,
            };

            match chunk {
                Ok(Some(bytes)) => {
                    if body.len() + bytes.len() > self.max_response_bytes {
                        return Err(FetchError::ResponseTooLarge {
                            url: endpoint.to_string(),
                            limit: self.max_response_bytes,
                        });
                    }
                    body.extend_from_slice(&bytes);
                }
                Ok(None) => break,
                Err(source) => {
                    self.controller.on_transport_failure(key, &mut lock(state));
                    tracing::warn!("Reading body from {} failed: {}", endpoint, source);
                    return Err(FetchError::Transport {
                        url: endpoint.to_string(),
                        source,
                    });
                }
            }
        }

        if body.is_empty() {
            return Err(FetchError::EmptyBody {
                url: endpoint.to_string(),
            });
        }

        self.controller.on_success(key, &mut lock(state), &limits);
        Ok(body)
    }
}

/// Sleeps for `duration` unless the token is cancelled first
async fn pause(duration: Duration, endpoint: &str, cancel: &CancellationToken) -> FetchResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled(endpoint)),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

fn cancelled(endpoint: &str) -> FetchError {
    tracing::debug!("Fetch of {} cancelled", endpoint);
    FetchError::Cancelled {
        url: endpoint.to_string(),
    }
}
