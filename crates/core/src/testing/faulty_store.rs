//! Store double that injects record-write failures.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::campaign::{
    Aggregate, Campaign, CampaignStatus, CampaignStore, NewCampaign, Recipient, SendRecord,
    StoreError,
};

/// Wrapper around a real store whose record-level writes can be made to
/// fail after a configurable budget.
///
/// Only `record_attempt` and the `mark_*` mutations consume the budget.
/// Reads and campaign-level writes always pass through, so status
/// transitions stay observable while the record path is down.
pub struct FaultyStore {
    inner: Arc<dyn CampaignStore>,
    /// Remaining record writes before failures start. -1 means never fail.
    write_budget: AtomicI64,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn CampaignStore>) -> Self {
        Self {
            inner,
            write_budget: AtomicI64::new(-1),
        }
    }

    /// Let the next `n` record writes succeed, then fail every one after.
    pub fn fail_writes_after(&self, n: i64) {
        self.write_budget.store(n, Ordering::SeqCst);
    }

    /// Stop injecting failures.
    pub fn restore(&self) {
        self.write_budget.store(-1, Ordering::SeqCst);
    }

    fn take_write_slot(&self) -> Result<(), StoreError> {
        self.write_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |budget| match budget {
                -1 => Some(-1),
                0 => None,
                n => Some(n - 1),
            })
            .map(|_| ())
            .map_err(|_| StoreError::Database("simulated write failure".to_string()))
    }
}

impl CampaignStore for FaultyStore {
    fn create_campaign(
        &self,
        request: NewCampaign,
        recipients: &[Recipient],
    ) -> Result<Campaign, StoreError> {
        self.inner.create_campaign(request, recipients)
    }

    fn campaign(&self, id: &str) -> Result<Option<Campaign>, StoreError> {
        self.inner.campaign(id)
    }

    fn list_campaigns(&self, limit: i64, offset: i64) -> Result<Vec<Campaign>, StoreError> {
        self.inner.list_campaigns(limit, offset)
    }

    fn set_campaign_status(
        &self,
        id: &str,
        status: CampaignStatus,
    ) -> Result<Campaign, StoreError> {
        self.inner.set_campaign_status(id, status)
    }

    fn pending_records(&self, campaign_id: &str) -> Result<Vec<SendRecord>, StoreError> {
        self.inner.pending_records(campaign_id)
    }

    fn failed_records(&self, campaign_id: &str) -> Result<Vec<SendRecord>, StoreError> {
        self.inner.failed_records(campaign_id)
    }

    fn record(&self, campaign_id: &str, phone: &str) -> Result<Option<SendRecord>, StoreError> {
        self.inner.record(campaign_id, phone)
    }

    fn record_attempt(&self, campaign_id: &str, phone: &str) -> Result<u32, StoreError> {
        self.take_write_slot()?;
        self.inner.record_attempt(campaign_id, phone)
    }

    fn mark_sent(
        &self,
        campaign_id: &str,
        phone: &str,
        message_id: &str,
    ) -> Result<(), StoreError> {
        self.take_write_slot()?;
        self.inner.mark_sent(campaign_id, phone, message_id)
    }

    fn mark_failed(&self, campaign_id: &str, phone: &str, error: &str) -> Result<(), StoreError> {
        self.take_write_slot()?;
        self.inner.mark_failed(campaign_id, phone, error)
    }

    fn mark_cancelled(&self, campaign_id: &str, phone: &str) -> Result<(), StoreError> {
        self.take_write_slot()?;
        self.inner.mark_cancelled(campaign_id, phone)
    }

    fn aggregate(&self, campaign_id: &str) -> Result<Aggregate, StoreError> {
        self.inner.aggregate(campaign_id)
    }
}
