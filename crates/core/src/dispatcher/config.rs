//! Dispatcher configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the campaign dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Number of concurrent send workers.
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Maximum delivery attempts per recipient (first try included).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial retry backoff (milliseconds). Doubles on each retry.
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,

    /// Upper bound for the retry backoff (milliseconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Provider request budget shared by all workers (0 = unlimited).
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rpm: u32,

    /// Per-request send timeout (seconds).
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u32,
}

fn default_workers() -> u32 {
    8
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_rate_limit() -> u32 {
    60
}

fn default_send_timeout() -> u32 {
    30
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_ms: default_max_backoff(),
            rate_limit_rpm: default_rate_limit(),
            send_timeout_secs: default_send_timeout(),
        }
    }
}
