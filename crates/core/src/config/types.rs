use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::dispatcher::DispatcherConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub provider: TwilioConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("megaphone.db")
}

/// Twilio WhatsApp provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TwilioConfig {
    /// Twilio account SID
    pub account_sid: String,
    /// Twilio auth token
    pub auth_token: String,
    /// Messaging service SID used as the sender (preferred over from_number)
    #[serde(default)]
    pub messaging_service_sid: Option<String>,
    /// WhatsApp-enabled sender number (e.g., "+14155238886")
    #[serde(default)]
    pub from_number: Option<String>,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_timeout() -> u32 {
    30
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub provider: SanitizedTwilioConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub dispatcher: DispatcherConfig,
}

/// Sanitized Twilio config (auth token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTwilioConfig {
    pub account_sid: String,
    pub auth_token_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messaging_service_sid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_number: Option<String>,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            provider: SanitizedTwilioConfig {
                account_sid: config.provider.account_sid.clone(),
                auth_token_configured: !config.provider.auth_token.is_empty(),
                messaging_service_sid: config.provider.messaging_service_sid.clone(),
                from_number: config.provider.from_number.clone(),
                timeout_secs: config.provider.timeout_secs,
            },
            server: config.server.clone(),
            database: config.database.clone(),
            dispatcher: config.dispatcher.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> TwilioConfig {
        TwilioConfig {
            account_sid: "AC123".to_string(),
            auth_token: "secret".to_string(),
            messaging_service_sid: None,
            from_number: Some("+14155238886".to_string()),
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_deserialize_valid_config() {
        let toml = r#"
[provider]
account_sid = "AC123"
auth_token = "secret"
from_number = "+14155238886"

[server]
host = "127.0.0.1"
port = 9000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.provider.account_sid, "AC123");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
    }

    #[test]
    fn test_deserialize_with_default_server() {
        let toml = r#"
[provider]
account_sid = "AC123"
auth_token = "secret"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
    }

    #[test]
    fn test_deserialize_missing_provider_fails() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_with_default_database_and_dispatcher() {
        let toml = r#"
[provider]
account_sid = "AC123"
auth_token = "secret"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.path.to_str().unwrap(), "megaphone.db");
        assert_eq!(config.dispatcher.workers, 8);
        assert_eq!(config.dispatcher.max_attempts, 3);
        assert_eq!(config.provider.timeout_secs, 30);
    }

    #[test]
    fn test_deserialize_with_custom_dispatcher() {
        let toml = r#"
[provider]
account_sid = "AC123"
auth_token = "secret"

[dispatcher]
workers = 4
rate_limit_rpm = 120
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.dispatcher.workers, 4);
        assert_eq!(config.dispatcher.rate_limit_rpm, 120);
        assert_eq!(config.dispatcher.max_attempts, 3);
    }

    #[test]
    fn test_sanitized_config_hides_auth_token() {
        let config = Config {
            provider: provider(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            dispatcher: DispatcherConfig::default(),
        };
        let sanitized = SanitizedConfig::from(&config);
        assert_eq!(sanitized.provider.account_sid, "AC123");
        assert!(sanitized.provider.auth_token_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("auth_token\""));
    }

    #[test]
    fn test_sanitized_config_empty_token_not_configured() {
        let mut p = provider();
        p.auth_token = String::new();
        let config = Config {
            provider: p,
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            dispatcher: DispatcherConfig::default(),
        };
        let sanitized = SanitizedConfig::from(&config);
        assert!(!sanitized.provider.auth_token_configured);
    }
}
