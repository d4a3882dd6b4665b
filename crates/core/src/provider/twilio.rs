//! Twilio WhatsApp gateway implementation.
//!
//! Sends templated WhatsApp messages through Twilio's Messages API using
//! a pre-approved content template (ContentSid) and per-recipient content
//! variables.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::TwilioConfig;

use super::{ProviderError, ProviderGateway, ProviderMessageId, SendRequest};

/// Twilio error codes that are safe to retry despite a 4xx status.
/// 20429 is Twilio's "too many requests" code.
const RETRYABLE_TWILIO_CODES: &[u32] = &[20429];

/// Twilio WhatsApp gateway.
pub struct TwilioGateway {
    client: Client,
    config: TwilioConfig,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    #[serde(default)]
    code: Option<u32>,
    #[serde(default)]
    message: Option<String>,
}

impl TwilioGateway {
    /// Create a new gateway with the given configuration.
    pub fn new(config: TwilioConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| ProviderError::permanent(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn messages_url(&self) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            urlencoding::encode(&self.config.account_sid)
        )
    }

    /// Classify an HTTP failure into Transient/Permanent.
    ///
    /// 429 and 5xx are retryable; everything else (bad number, unapproved
    /// template, auth failure) is permanent, with a short list of Twilio
    /// error codes overriding the status.
    fn classify_response(status: StatusCode, body: &str) -> ProviderError {
        let parsed: Option<TwilioErrorBody> = serde_json::from_str(body).ok();
        let code = parsed.as_ref().and_then(|b| b.code);
        let detail = parsed
            .and_then(|b| b.message)
            .map(|m| clean_provider_error(&m))
            .unwrap_or_else(|| format!("HTTP {}", status));

        let transient = status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
            || code.is_some_and(|c| RETRYABLE_TWILIO_CODES.contains(&c));

        if transient {
            ProviderError::transient(detail)
        } else {
            ProviderError::permanent(detail)
        }
    }
}

#[async_trait]
impl ProviderGateway for TwilioGateway {
    async fn send(&self, request: SendRequest) -> Result<ProviderMessageId, ProviderError> {
        let content_variables = serde_json::to_string(&request.variables)
            .map_err(|e| ProviderError::permanent(format!("bad content variables: {}", e)))?;

        let mut form = vec![
            ("To".to_string(), format!("whatsapp:{}", request.phone)),
            ("ContentSid".to_string(), request.template_id.clone()),
            ("ContentVariables".to_string(), content_variables),
        ];
        if let Some(ref service_sid) = self.config.messaging_service_sid {
            form.push(("MessagingServiceSid".to_string(), service_sid.clone()));
        }
        if let Some(ref from) = self.config.from_number {
            form.push(("From".to_string(), format!("whatsapp:{}", from)));
        }

        debug!(phone = %request.phone, template = %request.template_id, "Sending via Twilio");

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .timeout(request.timeout)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::timeout()
                } else if e.is_connect() {
                    ProviderError::transient(format!("connection failed: {}", e))
                } else {
                    ProviderError::transient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = Self::classify_response(status, &body);
            warn!(phone = %request.phone, kind = %err.kind, "Twilio send failed: {}", err.detail);
            return Err(err);
        }

        let message: MessageResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::transient(format!("bad response body: {}", e)))?;

        Ok(ProviderMessageId(message.sid))
    }

    fn provider_name(&self) -> &'static str {
        "twilio"
    }
}

/// Reduce a verbose Twilio error message to the meaningful part.
///
/// The API sometimes wraps the actual cause in boilerplate and a docs
/// link; keep only the text before the link.
pub fn clean_provider_error(raw: &str) -> String {
    let marker = "Twilio returned the following information:";
    let text = match raw.split_once(marker) {
        Some((_, rest)) => rest,
        None => raw,
    };
    let text = match text.split_once("More information may be available here:") {
        Some((head, _)) => head,
        None => text,
    };
    text.trim().to_string()
}
