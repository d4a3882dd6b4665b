//! Types for the campaign dispatcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::campaign::{CampaignStatus, StoreError};

/// Errors that can occur while dispatching a campaign.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Campaign not found.
    #[error("campaign not found: {0}")]
    CampaignNotFound(String),

    /// Campaign is in a state that cannot be dispatched.
    #[error("campaign {id} cannot be dispatched from status {status}")]
    NotRunnable { id: String, status: CampaignStatus },

    /// The record store failed mid-run; the campaign is left stalled.
    #[error("record store unavailable for campaign {id}: {source}")]
    StoreUnavailable { id: String, source: StoreError },

    /// Record store error outside a send loop.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Cooperative cancellation flag shared between the dispatcher and the API.
///
/// Cancelling stops new sends promptly; a send already in flight is
/// allowed to finish and its outcome is recorded normally.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Outcome of a completed dispatch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSummary {
    /// Campaign this run belonged to.
    pub campaign_id: String,
    /// Final campaign status after the run.
    pub status: CampaignStatus,
    /// Records delivered during the whole campaign.
    pub sent: u32,
    /// Records that exhausted retries or failed permanently.
    pub failed: u32,
    /// Records cancelled before a delivery outcome.
    pub cancelled: u32,
    /// Roster size.
    pub total: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_handle_starts_clear() {
        let handle = CancelHandle::new();
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn test_cancel_handle_shared_across_clones() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        clone.cancel();
        assert!(handle.is_cancelled());

        // Cancelling again is harmless
        handle.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_error_display() {
        let err = DispatchError::CampaignNotFound("camp-1".to_string());
        assert_eq!(err.to_string(), "campaign not found: camp-1");

        let err = DispatchError::NotRunnable {
            id: "camp-2".to_string(),
            status: CampaignStatus::Completed,
        };
        assert_eq!(
            err.to_string(),
            "campaign camp-2 cannot be dispatched from status completed"
        );
    }
}
