//! Mock provider gateway for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::provider::{ProviderError, ProviderGateway, ProviderMessageId, SendRequest};

/// A recorded send for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSend {
    /// The request that was made.
    pub request: SendRequest,
    /// When the request was made.
    pub timestamp: chrono::DateTime<Utc>,
}

/// Mock implementation of the ProviderGateway trait.
///
/// Provides controllable behavior for testing:
/// - Track send calls for assertions
/// - Script per-phone outcome sequences (e.g. transient error, then success)
/// - Simulate provider latency
///
/// Unscripted phones succeed with a generated message id. Scripted
/// outcomes are consumed in order; once exhausted the phone falls back
/// to the default success.
pub struct MockGateway {
    /// Recorded send calls.
    calls: Arc<RwLock<Vec<RecordedSend>>>,
    /// Scripted outcomes by phone, consumed front to back.
    scripts: Arc<RwLock<HashMap<String, Vec<Result<String, ProviderError>>>>>,
    /// Artificial latency applied to every send.
    latency: Arc<RwLock<Option<Duration>>>,
    /// Counter for generating message ids.
    id_counter: Arc<RwLock<u32>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    /// Create a mock gateway where every send succeeds.
    pub fn new() -> Self {
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            scripts: Arc::new(RwLock::new(HashMap::new())),
            latency: Arc::new(RwLock::new(None)),
            id_counter: Arc::new(RwLock::new(0)),
        }
    }

    /// Script the outcomes for a phone, consumed one per send call.
    pub async fn script(&self, phone: &str, outcomes: Vec<Result<String, ProviderError>>) {
        self.scripts
            .write()
            .await
            .insert(phone.to_string(), outcomes);
    }

    /// Script a phone to always fail with the given error.
    pub async fn always_fail(&self, phone: &str, error: ProviderError) {
        // A long scripted run is equivalent to "always" for any test
        self.script(phone, vec![Err(error); 100]).await;
    }

    /// Simulate provider latency on every send.
    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.write().await = Some(latency);
    }

    /// All recorded send calls, in order.
    pub async fn sent_requests(&self) -> Vec<RecordedSend> {
        self.calls.read().await.clone()
    }

    /// Number of send calls made for a phone.
    pub async fn call_count(&self, phone: &str) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.request.phone == phone)
            .count()
    }

    /// Total number of send calls.
    pub async fn total_calls(&self) -> usize {
        self.calls.read().await.len()
    }

    async fn next_message_id(&self) -> String {
        let mut counter = self.id_counter.write().await;
        *counter += 1;
        format!("SM{:08}", *counter)
    }
}

#[async_trait]
impl ProviderGateway for MockGateway {
    async fn send(&self, request: SendRequest) -> Result<ProviderMessageId, ProviderError> {
        self.calls.write().await.push(RecordedSend {
            request: request.clone(),
            timestamp: Utc::now(),
        });

        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let scripted = {
            let mut scripts = self.scripts.write().await;
            match scripts.get_mut(&request.phone) {
                Some(outcomes) if !outcomes.is_empty() => Some(outcomes.remove(0)),
                _ => None,
            }
        };

        match scripted {
            Some(Ok(id)) => Ok(ProviderMessageId(id)),
            Some(Err(err)) => Err(err),
            None => Ok(ProviderMessageId(self.next_message_id().await)),
        }
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(phone: &str) -> SendRequest {
        SendRequest {
            phone: phone.to_string(),
            template_id: "HX1".to_string(),
            variables: Default::default(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_default_send_succeeds() {
        let gateway = MockGateway::new();
        let id = gateway.send(request("+15550000001")).await.unwrap();
        assert!(id.0.starts_with("SM"));
        assert_eq!(gateway.total_calls().await, 1);
    }

    #[tokio::test]
    async fn test_scripted_outcomes_consumed_in_order() {
        let gateway = MockGateway::new();
        gateway
            .script(
                "+15550000001",
                vec![
                    Err(ProviderError::transient("rate limited")),
                    Ok("SM-custom".to_string()),
                ],
            )
            .await;

        let err = gateway.send(request("+15550000001")).await.unwrap_err();
        assert!(err.is_transient());

        let id = gateway.send(request("+15550000001")).await.unwrap();
        assert_eq!(id.0, "SM-custom");

        // Script exhausted, back to default success
        let id = gateway.send(request("+15550000001")).await.unwrap();
        assert!(id.0.starts_with("SM0"));
    }

    #[tokio::test]
    async fn test_call_count_per_phone() {
        let gateway = MockGateway::new();
        gateway.send(request("+15550000001")).await.unwrap();
        gateway.send(request("+15550000001")).await.unwrap();
        gateway.send(request("+15550000002")).await.unwrap();

        assert_eq!(gateway.call_count("+15550000001").await, 2);
        assert_eq!(gateway.call_count("+15550000002").await, 1);
        assert_eq!(gateway.call_count("+15550000003").await, 0);
    }

    #[tokio::test]
    async fn test_always_fail() {
        let gateway = MockGateway::new();
        gateway
            .always_fail("+15550000001", ProviderError::permanent("invalid number"))
            .await;

        for _ in 0..5 {
            let err = gateway.send(request("+15550000001")).await.unwrap_err();
            assert!(!err.is_transient());
        }
    }
}
