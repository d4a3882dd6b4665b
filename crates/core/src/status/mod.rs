//! Campaign status aggregation.
//!
//! The per-recipient records are the source of truth; campaign-level
//! status and counts are always derived from them, never cached.

use serde::{Deserialize, Serialize};

use crate::campaign::{Aggregate, CampaignStatus, CampaignStore, StoreError};

/// Point-in-time view of a campaign and its aggregate counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSnapshot {
    pub id: String,
    pub template_id: String,
    pub template_name: String,
    pub status: CampaignStatus,
    pub sent: u32,
    pub failed: u32,
    pub pending: u32,
    pub cancelled: u32,
    pub total: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Build a snapshot for a campaign, recomputing counts from records.
pub fn snapshot(
    store: &dyn CampaignStore,
    campaign_id: &str,
) -> Result<Option<CampaignSnapshot>, StoreError> {
    let Some(campaign) = store.campaign(campaign_id)? else {
        return Ok(None);
    };
    let agg = store.aggregate(campaign_id)?;

    Ok(Some(CampaignSnapshot {
        id: campaign.id,
        template_id: campaign.template_id,
        template_name: campaign.template_name,
        status: campaign.status,
        sent: agg.sent,
        failed: agg.failed,
        pending: agg.pending,
        cancelled: agg.cancelled,
        total: agg.total,
        created_at: campaign.created_at,
        updated_at: campaign.updated_at,
    }))
}

/// Derive the campaign status from its aggregate counts.
///
/// Rules, in order:
/// - records still pending: the campaign keeps its current in-flight status
/// - any record cancelled: the run was cancelled
/// - no failures: completed cleanly
/// - otherwise: completed with errors
pub fn resolve_status(current: CampaignStatus, agg: &Aggregate) -> CampaignStatus {
    if !agg.is_settled() {
        return current;
    }
    if agg.cancelled > 0 {
        return CampaignStatus::Cancelled;
    }
    if agg.failed == 0 {
        CampaignStatus::Completed
    } else {
        CampaignStatus::CompletedWithErrors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{NewCampaign, Recipient, SqliteCampaignStore};

    fn agg(sent: u32, failed: u32, pending: u32, cancelled: u32) -> Aggregate {
        Aggregate {
            sent,
            failed,
            pending,
            cancelled,
            total: sent + failed + pending + cancelled,
        }
    }

    #[test]
    fn test_resolve_all_sent_is_completed() {
        let status = resolve_status(CampaignStatus::Processing, &agg(5, 0, 0, 0));
        assert_eq!(status, CampaignStatus::Completed);
    }

    #[test]
    fn test_resolve_any_failure_is_completed_with_errors() {
        let status = resolve_status(CampaignStatus::Processing, &agg(4, 1, 0, 0));
        assert_eq!(status, CampaignStatus::CompletedWithErrors);
    }

    #[test]
    fn test_resolve_pending_keeps_current_status() {
        let status = resolve_status(CampaignStatus::Processing, &agg(2, 0, 3, 0));
        assert_eq!(status, CampaignStatus::Processing);

        let status = resolve_status(CampaignStatus::Stalled, &agg(2, 1, 3, 0));
        assert_eq!(status, CampaignStatus::Stalled);
    }

    #[test]
    fn test_resolve_cancelled_wins_over_failures() {
        let status = resolve_status(CampaignStatus::Processing, &agg(2, 1, 0, 3));
        assert_eq!(status, CampaignStatus::Cancelled);
    }

    #[test]
    fn test_snapshot_missing_campaign() {
        let store = SqliteCampaignStore::in_memory().unwrap();
        let snap = snapshot(&store, "nope").unwrap();
        assert!(snap.is_none());
    }

    #[test]
    fn test_snapshot_counts_match_records() {
        let store = SqliteCampaignStore::in_memory().unwrap();
        let recipients = vec![
            Recipient::new("+15550000001"),
            Recipient::new("+15550000002"),
            Recipient::new("+15550000003"),
        ];
        let campaign = store
            .create_campaign(NewCampaign::new("HX1", "welcome"), &recipients)
            .unwrap();

        store.record_attempt(&campaign.id, "+15550000001").unwrap();
        store
            .mark_sent(&campaign.id, "+15550000001", "SM123")
            .unwrap();
        store.record_attempt(&campaign.id, "+15550000002").unwrap();
        store
            .mark_failed(&campaign.id, "+15550000002", "unreachable")
            .unwrap();

        let snap = snapshot(&store, &campaign.id).unwrap().unwrap();
        assert_eq!(snap.sent, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.pending, 1);
        assert_eq!(snap.cancelled, 0);
        assert_eq!(snap.total, 3);
        assert_eq!(snap.template_name, "welcome");
        assert_eq!(snap.sent + snap.failed + snap.pending + snap.cancelled, snap.total);
    }
}
