use crate::adaptive::headers::{retry_after, RateLimitHeaders};
use crate::limiter::{RateLimiterState, BASE_BACKOFF, MAX_BACKOFF};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::time::Duration;

/// Rate multiplier applied after a transport failure
const TRANSPORT_FAILURE_FACTOR: f64 = 0.5;

/// Rate multiplier applied after an HTTP 429
const THROTTLE_FACTOR: f64 = 0.75;

/// Fraction of the advertised rate targeted when quota headers are present
const SAFETY_MARGIN: f64 = 0.8;

/// Largest step up toward the advertised safe rate per response
const MAX_STEP_UP: f64 = 1.10;

/// Largest step up driven by `Remaining` alone per response
const MAX_HEADROOM_STEP_UP: f64 = 1.20;

/// `Remaining` must exceed this many seconds of traffic to count as headroom
const HEADROOM_SECONDS: f64 = 10.0;

/// Bucket level under which a quiet success nudges the rate up
const STARVED_TOKENS: f64 = 0.1;

/// Rate multiplier for a quiet success on a starved bucket
const RECOVERY_FACTOR: f64 = 1.01;

/// What the fetcher should do with a response after the bucket was adjusted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// 200: read the body and report it through `on_success`
    Deliver,

    /// 429: sleep for `backoff` and try the same fetch again
    Retry { backoff: Duration },

    /// Anything else: surface as an error
    Reject { status: u16 },
}

/// Steers a bucket's rate and backoff from the responses it produces
///
/// The controller is stateless; everything it learns is written into the
/// `RateLimiterState` passed to it, which the caller must hold locked.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptiveController;

impl AdaptiveController {
    pub fn new() -> Self {
        Self
    }

    /// Classifies a response by status, adjusting the bucket for throttling
    ///
    /// A 200 is returned as `Deliver` without adjustment, since an empty body
    /// still has to be ruled out before the response counts as a success.
    pub fn classify(
        &self,
        key: &str,
        state: &mut RateLimiterState,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Verdict {
        if status == StatusCode::TOO_MANY_REQUESTS {
            let backoff = self.on_throttled(key, state, retry_after(headers));
            return Verdict::Retry { backoff };
        }

        if status == StatusCode::OK {
            return Verdict::Deliver;
        }

        if status.is_success() {
            // The server accepted the request, so its quota signals still
            // apply even though the status is not one we deliver.
            self.on_success(key, state, &RateLimitHeaders::from_headers(headers));
        }

        Verdict::Reject {
            status: status.as_u16(),
        }
    }

    /// A request could not be sent or its response could not be read
    pub fn on_transport_failure(&self, key: &str, state: &mut RateLimiterState) {
        let before = state.rate_per_sec();
        state.set_rate(before * TRANSPORT_FAILURE_FACTOR);

        tracing::debug!(
            "Transport failure for {}, rate {:.3} -> {:.3} req/s",
            key,
            before,
            state.rate_per_sec()
        );
    }

    /// The server answered 429; returns the backoff to wait before retrying
    pub fn on_throttled(
        &self,
        key: &str,
        state: &mut RateLimiterState,
        retry_after: Option<Duration>,
    ) -> Duration {
        let before = state.rate_per_sec();

        state.drain();
        state.record_throttle();
        state.set_rate(before * THROTTLE_FACTOR);

        let backoff = match retry_after {
            Some(hint) => hint,
            None => state.backoff().saturating_mul(2).min(MAX_BACKOFF),
        };
        state.set_backoff(backoff);

        tracing::warn!(
            "Throttled by {} (HTTP 429), rate {:.3} -> {:.3} req/s, backing off {:?}",
            key,
            before,
            state.rate_per_sec(),
            state.backoff()
        );

        state.backoff()
    }

    /// A non-empty 2xx response arrived
    ///
    /// Resets the backoff and moves the rate toward whatever the quota headers
    /// advertise. Without quota headers a starved bucket creeps up by 1%.
    pub fn on_success(&self, key: &str, state: &mut RateLimiterState, limits: &RateLimitHeaders) {
        state.set_backoff(BASE_BACKOFF);

        let before = state.rate_per_sec();

        if let Some(advertised) = limits.advertised_rate() {
            let safe = advertised * SAFETY_MARGIN;
            if safe > before {
                state.set_rate(safe.min(before * MAX_STEP_UP));
            } else {
                state.set_rate(safe);
            }
        } else if let Some(remaining) = limits.remaining {
            // Also reached when only one of limit / reset was sent
            if remaining > before * HEADROOM_SECONDS {
                let target = remaining / HEADROOM_SECONDS;
                state.set_rate(target.min(before * MAX_HEADROOM_STEP_UP));
            }
        } else if limits.is_empty() && state.tokens() < STARVED_TOKENS {
            state.set_rate(before * RECOVERY_FACTOR);
        }

        if state.rate_per_sec() != before {
            tracing::debug!(
                "Adjusted {} from {:.3} to {:.3} req/s",
                key,
                before,
                state.rate_per_sec()
            );
        }
    }
}
