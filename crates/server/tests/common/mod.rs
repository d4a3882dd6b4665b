//! Common test utilities for in-process API testing.
//!
//! Builds the full router with a temp-file SQLite store and a mock
//! provider gateway, so requests exercise the real handlers and the
//! real dispatch engine without external infrastructure.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use megaphone_core::config::{DatabaseConfig, ServerConfig};
use megaphone_core::testing::MockGateway;
use megaphone_core::{
    CampaignDispatcher, CampaignStore, Config, DispatcherConfig, ProviderGateway,
    SqliteCampaignStore, TwilioConfig,
};
use megaphone_server::{create_router, AppState};

/// Test fixture wrapping an in-process server.
pub struct TestFixture {
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: Arc<SqliteCampaignStore>,
    pub gateway: Arc<MockGateway>,
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_dispatcher_config(fast_dispatcher_config()).await
    }

    pub async fn with_dispatcher_config(dispatcher_config: DispatcherConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let config = Config {
            provider: TwilioConfig {
                account_sid: "ACtest".to_string(),
                auth_token: "secret-token".to_string(),
                messaging_service_sid: Some("MGtest".to_string()),
                from_number: None,
                timeout_secs: 5,
            },
            server: ServerConfig {
                host: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 0,
            },
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            dispatcher: dispatcher_config.clone(),
        };

        let store = Arc::new(
            SqliteCampaignStore::new(&db_path).expect("Failed to create campaign store"),
        );
        let gateway = Arc::new(MockGateway::new());

        let dispatcher = Arc::new(CampaignDispatcher::new(
            dispatcher_config,
            Arc::clone(&store) as Arc<dyn CampaignStore>,
            Arc::clone(&gateway) as Arc<dyn ProviderGateway>,
        ));

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&store) as Arc<dyn CampaignStore>,
            dispatcher,
        ));

        let router = create_router(Arc::clone(&state));

        Self {
            router,
            state,
            store,
            gateway,
            temp_dir,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Poll a campaign until it reaches the expected status.
    pub async fn wait_for_status(&self, campaign_id: &str, expected: &str) -> Value {
        for _ in 0..200 {
            let response = self.get(&format!("/api/v1/campaigns/{}", campaign_id)).await;
            if response.status == StatusCode::OK && response.body["status"] == expected {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "campaign {} did not reach status {} in time",
            campaign_id, expected
        );
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);

        let request = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                builder.body(Body::from(json.to_string())).unwrap()
            }
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Dispatcher settings tuned so retry tests finish quickly.
pub fn fast_dispatcher_config() -> DispatcherConfig {
    DispatcherConfig {
        workers: 4,
        max_attempts: 3,
        base_backoff_ms: 1,
        max_backoff_ms: 5,
        rate_limit_rpm: 0,
        send_timeout_secs: 5,
    }
}

/// Build a headered roster CSV for n recipients.
pub fn roster_csv(n: usize) -> String {
    let mut csv = String::from("phone,1\n");
    for i in 0..n {
        csv.push_str(&format!("+1555000{:04},Recipient {}\n", i, i));
    }
    csv
}
