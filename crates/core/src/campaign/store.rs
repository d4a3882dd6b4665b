//! Campaign storage trait and types.

use thiserror::Error;

use super::{Aggregate, Campaign, CampaignStatus, Recipient, SendRecord};

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Campaign not found.
    #[error("campaign not found: {0}")]
    NotFound(String),

    /// Send record not found.
    #[error("send record not found: campaign {campaign_id}, phone {phone}")]
    RecordNotFound { campaign_id: String, phone: String },

    /// A campaign with this id already has records initialized.
    #[error("campaign already exists: {0}")]
    DuplicateCampaign(String),

    /// Attempted to overwrite a record that already reached a terminal status.
    #[error("send record already terminal: campaign {campaign_id}, phone {phone}, status {status}")]
    RecordTerminal {
        campaign_id: String,
        phone: String,
        status: String,
    },

    /// Cannot perform operation due to the campaign's current status.
    #[error("cannot {operation} campaign {campaign_id}: current status is {current_status}")]
    InvalidStatus {
        campaign_id: String,
        current_status: String,
        operation: String,
    },

    /// Database error. Mid-run, the dispatcher treats this as store
    /// unavailability and halts rather than losing outcomes.
    #[error("database error: {0}")]
    Database(String),
}

/// Request to create a new campaign.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    /// Campaign id. None = generate a UUID. Passing an id that already has
    /// records initialized is an integration error and fails with
    /// [`StoreError::DuplicateCampaign`].
    pub id: Option<String>,
    /// Provider template identifier.
    pub template_id: String,
    /// Human-readable template name.
    pub template_name: String,
}

impl NewCampaign {
    pub fn new(template_id: impl Into<String>, template_name: impl Into<String>) -> Self {
        Self {
            id: None,
            template_id: template_id.into(),
            template_name: template_name.into(),
        }
    }

    /// Use an explicit campaign id instead of a generated UUID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Trait for campaign storage backends.
///
/// Holds both the campaign rows and the per-recipient send records.
/// Updates for different record keys may be issued concurrently from
/// multiple dispatch workers; updates for the same key are serialized by
/// the engine.
pub trait CampaignStore: Send + Sync {
    /// Create a campaign and bulk-initialize one Pending send record per
    /// recipient, in a single transaction.
    ///
    /// Duplicate phone numbers collapse last-write-wins: the later
    /// occurrence's variables replace the earlier one's, and the campaign
    /// total reflects the deduplicated count.
    fn create_campaign(
        &self,
        request: NewCampaign,
        recipients: &[Recipient],
    ) -> Result<Campaign, StoreError>;

    /// Get a campaign by id.
    fn campaign(&self, id: &str) -> Result<Option<Campaign>, StoreError>;

    /// List campaigns, newest first.
    fn list_campaigns(&self, limit: i64, offset: i64) -> Result<Vec<Campaign>, StoreError>;

    /// Update a campaign's status. Refuses transitions out of a terminal
    /// status.
    fn set_campaign_status(&self, id: &str, status: CampaignStatus)
        -> Result<Campaign, StoreError>;

    /// All Pending records for a campaign (the resumable work set).
    fn pending_records(&self, campaign_id: &str) -> Result<Vec<SendRecord>, StoreError>;

    /// All Failed records for a campaign, for per-recipient inspection.
    fn failed_records(&self, campaign_id: &str) -> Result<Vec<SendRecord>, StoreError>;

    /// Look up a single record by campaign and phone.
    fn record(&self, campaign_id: &str, phone: &str) -> Result<Option<SendRecord>, StoreError>;

    /// Increment the attempt counter and stamp the attempt time for a
    /// Pending record. Returns the new attempt count.
    fn record_attempt(&self, campaign_id: &str, phone: &str) -> Result<u32, StoreError>;

    /// Mark a record Sent with the provider message id.
    fn mark_sent(
        &self,
        campaign_id: &str,
        phone: &str,
        message_id: &str,
    ) -> Result<(), StoreError>;

    /// Mark a record Failed with the classified error detail.
    fn mark_failed(&self, campaign_id: &str, phone: &str, error: &str) -> Result<(), StoreError>;

    /// Mark a record Cancelled (operator-initiated cancellation).
    fn mark_cancelled(&self, campaign_id: &str, phone: &str) -> Result<(), StoreError>;

    /// Recompute the aggregate counts for a campaign from its records.
    fn aggregate(&self, campaign_id: &str) -> Result<Aggregate, StoreError>;
}
