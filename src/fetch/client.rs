//! HTTP client construction

use crate::config::{FetcherConfig, UserAgentConfig};
use reqwest::Client;
use std::time::Duration;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `fetcher` - Timeouts and scheme restrictions
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use sumi_fetch::config::{FetcherConfig, UserAgentConfig};
/// use sumi_fetch::fetch::build_http_client;
///
/// let user_agent = UserAgentConfig {
///     client_name: "SumiFetch".to_string(),
///     client_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&user_agent, &FetcherConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    fetcher: &FetcherConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_millis(fetcher.request_timeout_ms))
        .connect_timeout(Duration::from_millis(fetcher.connect_timeout_ms))
        .https_only(fetcher.https_only)
        .gzip(true)
        .brotli(true)
        .build()
}
