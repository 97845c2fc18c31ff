use crate::limiter::bucket::{LimiterSnapshot, RateLimiterState};
use lru::LruCache;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use url::Url;

/// A bucket shared between the registry and the fetches using it
pub type SharedState = Arc<Mutex<RateLimiterState>>;

/// How endpoints are grouped into rate-limit keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStrategy {
    /// One bucket per full URL (fragment excluded)
    #[default]
    Url,

    /// One bucket per host and explicit port
    Host,
}

/// Owns one token bucket per rate-limit key
///
/// Two levels of locking keep unrelated keys from serializing behind each
/// other: the registry lock is held only long enough to find or insert a
/// bucket, and every bucket carries its own lock for refill, consume and
/// adjustment. Lock order is always registry, then bucket.
///
/// The key space is bounded by an LRU; an evicted bucket stays alive for any
/// fetch still holding it and is recreated fresh on the next lookup.
#[derive(Debug)]
pub struct LimiterRegistry {
    strategy: KeyStrategy,
    states: Mutex<LruCache<String, SharedState>>,
}

impl LimiterRegistry {
    /// Creates an empty registry tracking at most `capacity` keys
    pub fn new(strategy: KeyStrategy, capacity: NonZeroUsize) -> Self {
        Self {
            strategy,
            states: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The strategy used to derive keys from endpoints
    pub fn strategy(&self) -> KeyStrategy {
        self.strategy
    }

    /// Derives the rate-limit key for an endpoint
    ///
    /// # Example
    ///
    /// ```
    /// use std::num::NonZeroUsize;
    /// use sumi_fetch::limiter::{KeyStrategy, LimiterRegistry};
    /// use url::Url;
    ///
    /// let registry = LimiterRegistry::new(KeyStrategy::Host, NonZeroUsize::new(16).unwrap());
    /// let url = Url::parse("https://api.example.com:8443/v1/items?page=2").unwrap();
    /// assert_eq!(registry.key_for(&url), "api.example.com:8443");
    /// ```
    pub fn key_for(&self, endpoint: &Url) -> String {
        match self.strategy {
            KeyStrategy::Url => {
                let mut url = endpoint.clone();
                url.set_fragment(None);
                url.into()
            }
            KeyStrategy::Host => {
                let host = endpoint.host_str().unwrap_or_default();
                match endpoint.port() {
                    Some(port) => format!("{}:{}", host, port),
                    None => host.to_string(),
                }
            }
        }
    }

    /// Returns the bucket for `key`, creating it at `initial_rate` if absent
    ///
    /// Concurrent first lookups of the same key all receive the same bucket.
    /// An existing bucket keeps its learned rate; `initial_rate` only seeds
    /// new ones.
    pub fn get_or_create(&self, key: &str, initial_rate: f64) -> SharedState {
        let mut states = lock(&self.states);

        if let Some(state) = states.get(key) {
            return Arc::clone(state);
        }

        tracing::debug!("Creating limiter for {} at {:.2} req/s", key, initial_rate);
        let state = Arc::new(Mutex::new(RateLimiterState::new(
            initial_rate,
            Instant::now(),
        )));
        states.put(key.to_string(), Arc::clone(&state));
        state
    }

    /// Returns the bucket for `key` without creating one or touching recency
    pub fn get(&self, key: &str) -> Option<SharedState> {
        lock(&self.states).peek(key).map(Arc::clone)
    }

    /// Takes a snapshot of one key's bucket
    pub fn snapshot(&self, key: &str) -> Option<LimiterSnapshot> {
        let state = self.get(key)?;
        let snapshot = lock(&state).snapshot();
        Some(snapshot)
    }

    /// Takes snapshots of every tracked key, sorted by key
    pub fn snapshots(&self) -> Vec<(String, LimiterSnapshot)> {
        // Clone the handles first so the registry lock is released before any
        // bucket lock is taken.
        let handles: Vec<(String, SharedState)> = lock(&self.states)
            .iter()
            .map(|(key, state)| (key.clone(), Arc::clone(state)))
            .collect();

        let mut snapshots: Vec<(String, LimiterSnapshot)> = handles
            .into_iter()
            .map(|(key, state)| {
                let snapshot = lock(&state).snapshot();
                (key, snapshot)
            })
            .collect();
        snapshots.sort_by(|a, b| a.0.cmp(&b.0));
        snapshots
    }

    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        lock(&self.states).len()
    }

    /// Whether no key is tracked yet
    pub fn is_empty(&self) -> bool {
        lock(&self.states).is_empty()
    }
}

/// Locks a mutex, recovering the data if a previous holder panicked
///
/// Every critical section in this crate leaves the bucket consistent between
/// statements, so a poisoned lock still guards valid state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
