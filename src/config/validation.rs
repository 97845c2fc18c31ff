use crate::config::types::{AuthConfig, BatchConfig, Config, FetcherConfig, UserAgentConfig};
use crate::limiter::MIN_RATE;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetcher_config(&config.fetcher)?;
    validate_batch_config(&config.batch, config.fetcher.https_only)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_auth_config(&config.auth)?;
    Ok(())
}

/// Validates fetcher configuration
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if !config.initial_rate.is_finite() || config.initial_rate < MIN_RATE {
        return Err(ConfigError::Validation(format!(
            "initial_rate must be a number >= {}, got {}",
            MIN_RATE, config.initial_rate
        )));
    }

    if config.request_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_ms must be >= 100ms, got {}ms",
            config.request_timeout_ms
        )));
    }

    if config.connect_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "connect_timeout_ms must be >= 100ms, got {}ms",
            config.connect_timeout_ms
        )));
    }

    if config.max_response_bytes < 1 {
        return Err(ConfigError::Validation(
            "max_response_bytes must be >= 1".to_string(),
        ));
    }

    if config.max_tracked_keys < 1 {
        return Err(ConfigError::Validation(
            "max_tracked_keys must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates batch configuration
fn validate_batch_config(config: &BatchConfig, https_only: bool) -> Result<(), ConfigError> {
    for target in &config.urls {
        validate_target_url(target, https_only)?;
    }
    Ok(())
}

/// Validates a URL to be fetched
pub fn validate_target_url(target: &str, https_only: bool) -> Result<(), ConfigError> {
    let url = Url::parse(target)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid target URL '{}': {}", target, e)))?;

    match url.scheme() {
        "https" => Ok(()),
        "http" if !https_only => Ok(()),
        "http" => Err(ConfigError::Validation(format!(
            "Target URL '{}' must use HTTPS scheme",
            target
        ))),
        other => Err(ConfigError::Validation(format!(
            "Target URL '{}' has unsupported scheme '{}'",
            target, other
        ))),
    }
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate client name: non-empty, alphanumeric + hyphens only
    if config.client_name.is_empty() {
        return Err(ConfigError::Validation(
            "client_name cannot be empty".to_string(),
        ));
    }

    if !config
        .client_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "client_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.client_name
        )));
    }

    // Validate contact URL
    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    // Validate contact email (basic validation)
    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates API key configuration
fn validate_auth_config(config: &AuthConfig) -> Result<(), ConfigError> {
    if let Some(var) = &config.api_key_env {
        if var.is_empty() || var.contains('=') || var.contains('\0') {
            return Err(ConfigError::Validation(format!(
                "api_key_env must be a valid environment variable name, got '{}'",
                var
            )));
        }
    }
    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Basic email format check: must contain @ and have text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    // Domain part should contain at least one dot
    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
