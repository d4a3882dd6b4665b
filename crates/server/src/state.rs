use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use megaphone_core::{CampaignDispatcher, CampaignStore, CancelHandle, Config, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    store: Arc<dyn CampaignStore>,
    dispatcher: Arc<CampaignDispatcher>,
    /// Cancel handles for dispatch runs currently in flight, by campaign id.
    active_runs: RwLock<HashMap<String, CancelHandle>>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn CampaignStore>,
        dispatcher: Arc<CampaignDispatcher>,
    ) -> Self {
        Self {
            config,
            store,
            dispatcher,
            active_runs: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &dyn CampaignStore {
        self.store.as_ref()
    }

    pub fn dispatcher(&self) -> Arc<CampaignDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    /// Register a run, returning the handle the background task observes.
    /// Returns None when a run is already in flight for this campaign.
    pub async fn begin_run(&self, campaign_id: &str) -> Option<CancelHandle> {
        let mut runs = self.active_runs.write().await;
        if runs.contains_key(campaign_id) {
            return None;
        }
        let handle = CancelHandle::new();
        runs.insert(campaign_id.to_string(), handle.clone());
        Some(handle)
    }

    /// Drop a finished run's cancel handle.
    pub async fn end_run(&self, campaign_id: &str) {
        self.active_runs.write().await.remove(campaign_id);
    }

    /// Request cancellation of an in-flight run. Returns false when no run
    /// is active for this campaign.
    pub async fn cancel_run(&self, campaign_id: &str) -> bool {
        match self.active_runs.read().await.get(campaign_id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of in-flight dispatch runs.
    pub async fn active_run_count(&self) -> usize {
        self.active_runs.read().await.len()
    }
}
