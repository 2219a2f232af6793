use crate::config::types::CrawlConfig;
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &CrawlConfig) -> Result<(), ConfigError> {
    validate_concurrency(config)?;
    validate_user_agents(config)?;
    validate_http(config)?;
    validate_content_types(config)?;
    Ok(())
}

/// Validates the worker pool and control loop settings
fn validate_concurrency(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_pages < 1 || config.max_concurrent_pages > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_pages must be between 1 and 100, got {}",
            config.max_concurrent_pages
        )));
    }

    if config.poll_interval_ms < 1 {
        return Err(ConfigError::Validation(
            "poll_interval_ms must be >= 1ms".to_string(),
        ));
    }

    Ok(())
}

/// Validates the HTTP and robots.txt user agent strings
fn validate_user_agents(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.robots_user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "robots_user_agent cannot be empty".to_string(),
        ));
    }

    if config.robots_user_agent.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation(format!(
            "robots_user_agent must be a single product token, got '{}'",
            config.robots_user_agent
        )));
    }

    Ok(())
}

/// Validates request level settings
fn validate_http(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.http_request_timeout_seconds < 1 {
        return Err(ConfigError::Validation(
            "http_request_timeout_seconds must be >= 1".to_string(),
        ));
    }

    if config.auto_redirects && config.max_auto_redirects < 1 {
        return Err(ConfigError::Validation(
            "max_auto_redirects must be >= 1 when auto_redirects is enabled".to_string(),
        ));
    }

    Ok(())
}

/// Validates the downloadable content type list
fn validate_content_types(config: &CrawlConfig) -> Result<(), ConfigError> {
    let types = config.downloadable_content_types();
    if types.is_empty() {
        return Err(ConfigError::Validation(
            "downloadable_content_types must list at least one content type".to_string(),
        ));
    }

    if let Some(bad) = types.iter().find(|t| !t.contains('/')) {
        return Err(ConfigError::Validation(format!(
            "Invalid content type '{}', expected type/subtype",
            bad
        )));
    }

    Ok(())
}
