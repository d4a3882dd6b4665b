//! Types for provider gateway operations.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a provider failure.
///
/// This is the single most important contract at the gateway boundary:
/// the engine's retry policy depends entirely on it. A Permanent error
/// misclassified as Transient risks a retry storm against a rate-limited
/// API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rate limit, timeout, 5xx-equivalent. Eligible for retry.
    Transient,
    /// Invalid number, rejected template, auth failure. Never retried.
    Permanent,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// A classified provider failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} provider error: {detail}")]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl ProviderError {
    pub fn transient(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            detail: detail.into(),
        }
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            detail: detail.into(),
        }
    }

    /// A gateway call that exceeded its timeout. Always Transient.
    pub fn timeout() -> Self {
        Self::transient("request timed out")
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

/// Provider-assigned identifier of an accepted message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderMessageId(pub String);

impl fmt::Display for ProviderMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One send operation against the provider.
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Recipient phone number (E.164).
    pub phone: String,
    /// Provider template identifier.
    pub template_id: String,
    /// Template variable name -> value.
    pub variables: BTreeMap<String, String>,
    /// Bound on the whole call, enforced by the gateway.
    pub timeout: Duration,
}

/// Abstraction over the external messaging API.
///
/// Implementations are expected to have opaque latency and failure modes;
/// the only obligation is the Transient/Permanent classification of
/// [`ProviderError`].
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Send one templated message. Returns the provider message id on
    /// acceptance.
    async fn send(&self, request: SendRequest) -> Result<ProviderMessageId, ProviderError>;

    /// Name of the backing provider (for logs and metrics).
    fn provider_name(&self) -> &'static str;
}
