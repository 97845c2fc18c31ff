use crate::limiter::KeyStrategy;
use serde::Deserialize;

/// Main configuration structure for Sumi-Fetch
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Fetcher behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Requests per second a newly seen key starts at
    #[serde(rename = "initial-rate")]
    pub initial_rate: f64,

    /// Attempts per fetch before giving up on a throttled endpoint (0 = unbounded)
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Whole-request timeout (milliseconds)
    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,

    /// Connection establishment timeout (milliseconds)
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,

    /// Largest response body accepted (bytes)
    #[serde(rename = "max-response-bytes")]
    pub max_response_bytes: usize,

    /// Whether rate limits are tracked per URL or per host
    #[serde(rename = "key-strategy")]
    pub key_strategy: KeyStrategy,

    /// Maximum number of rate-limit keys remembered at once
    #[serde(rename = "max-tracked-keys")]
    pub max_tracked_keys: usize,

    /// Refuse plain-HTTP endpoints
    #[serde(rename = "https-only")]
    pub https_only: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            initial_rate: 5.0,
            max_attempts: 8,
            request_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            max_response_bytes: 50 * 1024 * 1024,
            key_strategy: KeyStrategy::Url,
            max_tracked_keys: 10_000,
            https_only: false,
        }
    }
}

/// Batch dispatch configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Cap on concurrently running fetches (0 = one task per URL, uncapped)
    #[serde(rename = "max-in-flight")]
    pub max_in_flight: usize,

    /// URLs fetched when none are given on the command line
    pub urls: Vec<String>,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the client
    #[serde(rename = "client-name")]
    pub client_name: String,

    /// Version of the client
    #[serde(rename = "client-version")]
    pub client_version: String,

    /// URL with information about the client
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for client-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value
    ///
    /// Format: `ClientName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.client_name, self.client_version, self.contact_url, self.contact_email
        )
    }
}

/// API key configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Environment variable holding the `X-API-KEY` value
    #[serde(rename = "api-key-env")]
    pub api_key_env: Option<String>,
}

impl AuthConfig {
    /// Reads the API key from the configured environment variable
    ///
    /// Returns `None` when no variable is configured, it is unset, or it is empty.
    pub fn resolve_api_key(&self) -> Option<String> {
        let var = self.api_key_env.as_deref()?;
        std::env::var(var).ok().filter(|key| !key.is_empty())
    }
}
