use crate::config::types::{BatchConfig, Config, OutputConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

const MAX_WINDOW_SIZE: usize = 10_000;
const MAX_RETRIES: u32 = 10;
const MIN_FETCH_TIMEOUT_MS: u64 = 100;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_batch_config(&config.batch)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates batch configuration
pub fn validate_batch_config(config: &BatchConfig) -> Result<(), ConfigError> {
    if config.window_size < 1 || config.window_size > MAX_WINDOW_SIZE {
        return Err(ConfigError::Validation(format!(
            "window_size must be between 1 and {}, got {}",
            MAX_WINDOW_SIZE, config.window_size
        )));
    }

    let sitemap = Url::parse(&config.sitemap_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid sitemap_url: {}", e)))?;
    if sitemap.scheme() != "http" && sitemap.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "sitemap_url must use http or https, got '{}'",
            sitemap.scheme()
        )));
    }

    if config.primary_selector.trim().is_empty() {
        return Err(ConfigError::Validation(
            "primary_selector cannot be empty".to_string(),
        ));
    }

    if config.secondary_selector.trim().is_empty() {
        return Err(ConfigError::Validation(
            "secondary_selector cannot be empty".to_string(),
        ));
    }

    if config.max_retries > MAX_RETRIES {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= {}, got {}",
            MAX_RETRIES, config.max_retries
        )));
    }

    if config.fetch_timeout_ms < MIN_FETCH_TIMEOUT_MS {
        return Err(ConfigError::Validation(format!(
            "fetch_timeout_ms must be >= {}ms, got {}ms",
            MIN_FETCH_TIMEOUT_MS, config.fetch_timeout_ms
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| ConfigError::Validation(format!("Invalid email format: '{}'", email)))?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
