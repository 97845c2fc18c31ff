use std::time::Duration;
use tokio::time::Instant;

/// Lowest rate a bucket can be driven to; keys are slowed, never stalled
pub const MIN_RATE: f64 = 0.1;

/// Backoff a key returns to after a clean success
pub const BASE_BACKOFF: Duration = Duration::from_secs(1);

/// Ceiling for the backoff applied after repeated throttling
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Slack for float drift when comparing token counts
const TOKEN_EPSILON: f64 = 1e-9;

/// Token bucket and backoff state for a single rate-limit key
///
/// The bucket holds fractional tokens that refill continuously at
/// `rate_per_sec`. The burst ceiling equals the sustained rate, so an idle key
/// never banks more than one second's worth of requests.
///
/// Invariants maintained by every mutator:
/// - `0 <= tokens <= rate_per_sec`
/// - `rate_per_sec >= MIN_RATE`
/// - `BASE_BACKOFF <= backoff <= MAX_BACKOFF`
#[derive(Debug, Clone)]
pub struct RateLimiterState {
    /// Available fractional tokens
    pub(crate) tokens: f64,

    /// Current allowed request rate
    pub(crate) rate_per_sec: f64,

    /// Last time tokens were topped up
    pub(crate) last_refill: Instant,

    /// Penalty wait applied after a throttling signal
    pub(crate) backoff: Duration,

    /// Tokens handed out since the key was created
    pub(crate) total_requests: u64,

    /// Number of 429 responses observed for this key
    pub(crate) throttle_hits: u64,
}

/// Point-in-time copy of a bucket, for monitoring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterSnapshot {
    pub tokens: f64,
    pub rate_per_sec: f64,
    pub backoff: Duration,
    pub total_requests: u64,
    pub throttle_hits: u64,
}

impl RateLimiterState {
    /// Creates a bucket at `initial_rate` holding a single token
    ///
    /// Rates below `MIN_RATE` (or non-finite rates) are raised to the floor.
    /// The first request for a new key is therefore never delayed.
    pub fn new(initial_rate: f64, now: Instant) -> Self {
        let rate_per_sec = if initial_rate.is_finite() {
            initial_rate.max(MIN_RATE)
        } else {
            MIN_RATE
        };

        Self {
            tokens: rate_per_sec.min(1.0),
            rate_per_sec,
            last_refill: now,
            backoff: BASE_BACKOFF,
            total_requests: 0,
            throttle_hits: 0,
        }
    }

    /// Adds `elapsed × rate_per_sec` tokens, capped at `rate_per_sec`
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.rate_per_sec);
        self.last_refill = now;
    }

    /// Takes one token if available
    ///
    /// Returns `Err(wait)` with the time until a token will be available when
    /// the bucket is short. Keys running below one request per second consume
    /// once the bucket is full, since the cap keeps them from ever holding a
    /// whole token.
    pub fn try_consume(&mut self) -> Result<(), Duration> {
        let needed = self.rate_per_sec.min(1.0);

        if self.tokens + TOKEN_EPSILON >= needed {
            self.tokens = (self.tokens - 1.0).max(0.0);
            self.total_requests += 1;
            return Ok(());
        }

        let wait = (needed - self.tokens) / self.rate_per_sec;
        Err(Duration::from_secs_f64(wait))
    }

    /// Refills the bucket to `now` and then tries to take a token
    pub fn acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        self.try_consume()
    }

    /// Sets the request rate, keeping it above the floor and the tokens under the new cap
    pub fn set_rate(&mut self, rate: f64) {
        self.rate_per_sec = if rate.is_finite() {
            rate.max(MIN_RATE)
        } else {
            MIN_RATE
        };
        self.tokens = self.tokens.min(self.rate_per_sec);
    }

    /// Sets the backoff, clamped into `[BASE_BACKOFF, MAX_BACKOFF]`
    pub fn set_backoff(&mut self, backoff: Duration) {
        self.backoff = backoff.clamp(BASE_BACKOFF, MAX_BACKOFF);
    }

    /// Empties the bucket so no further request goes out until it refills
    pub fn drain(&mut self) {
        self.tokens = 0.0;
    }

    /// Records a 429 against this key
    pub fn record_throttle(&mut self) {
        self.throttle_hits += 1;
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn rate_per_sec(&self) -> f64 {
        self.rate_per_sec
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn throttle_hits(&self) -> u64 {
        self.throttle_hits
    }

    /// Copies the current counters out of the bucket
    pub fn snapshot(&self) -> LimiterSnapshot {
        LimiterSnapshot {
            tokens: self.tokens,
            rate_per_sec: self.rate_per_sec,
            backoff: self.backoff,
            total_requests: self.total_requests,
            throttle_hits: self.throttle_hits,
        }
    }
}
