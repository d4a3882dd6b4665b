use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Provider section exists (enforced by serde)
/// - Provider has a usable sender (messaging service SID or from number)
/// - Server port is not 0
/// - Dispatcher worker count and attempt budget are positive
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Provider validation
    if config.provider.account_sid.is_empty() {
        return Err(ConfigError::ValidationError(
            "provider.account_sid cannot be empty".to_string(),
        ));
    }
    if config.provider.auth_token.is_empty() {
        return Err(ConfigError::ValidationError(
            "provider.auth_token cannot be empty".to_string(),
        ));
    }
    if config.provider.messaging_service_sid.is_none() && config.provider.from_number.is_none() {
        return Err(ConfigError::ValidationError(
            "provider requires messaging_service_sid or from_number".to_string(),
        ));
    }

    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    // Dispatcher validation
    if config.dispatcher.workers == 0 {
        return Err(ConfigError::ValidationError(
            "dispatcher.workers must be at least 1".to_string(),
        ));
    }
    if config.dispatcher.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "dispatcher.max_attempts must be at least 1".to_string(),
        ));
    }
    if config.dispatcher.max_backoff_ms < config.dispatcher.base_backoff_ms {
        return Err(ConfigError::ValidationError(
            "dispatcher.max_backoff_ms cannot be lower than base_backoff_ms".to_string(),
        ));
    }

    Ok(())
}
