//! Core campaign and send record data types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single recipient of a campaign.
///
/// Loaded from the roster before dispatch begins and read-only afterwards.
/// The `variables` map substitutes into the provider template by name
/// (Twilio content variables are keyed "1", "2", ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipient {
    /// Phone number in E.164 form (unique within a campaign).
    pub phone: String,
    /// Template variable name -> value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
}

impl Recipient {
    /// Create a recipient with no template variables.
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            variables: BTreeMap::new(),
        }
    }

    /// Add a template variable.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

/// Aggregate status of a campaign.
///
/// State machine flow:
/// ```text
/// Queued -> Processing -> {Completed, CompletedWithErrors, Cancelled}
///               |
///               v
///            Stalled  (store failure mid-run, resumable)
/// ```
///
/// Completed, CompletedWithErrors and Cancelled are terminal. Stalled is
/// not: a re-run picks up the remaining Pending records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// Campaign created, dispatch not yet started.
    Queued,
    /// Dispatch in progress.
    Processing,
    /// Every send record reached Sent.
    Completed,
    /// All records terminal, at least one Failed.
    CompletedWithErrors,
    /// Operator cancelled the run; remaining Pending records were marked
    /// Cancelled so the aggregate stays consistent.
    Cancelled,
    /// The store became unavailable mid-run and outcomes could no longer be
    /// persisted. Remaining records stay Pending until resumed.
    Stalled,
}

impl CampaignStatus {
    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CampaignStatus::Completed
                | CampaignStatus::CompletedWithErrors
                | CampaignStatus::Cancelled
        )
    }

    /// Returns true if a dispatch run may be started (or resumed) from this
    /// status.
    pub fn is_runnable(&self) -> bool {
        matches!(
            self,
            CampaignStatus::Queued | CampaignStatus::Processing | CampaignStatus::Stalled
        )
    }

    /// Returns the status as a string (for filtering and metrics labels).
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Queued => "queued",
            CampaignStatus::Processing => "processing",
            CampaignStatus::Completed => "completed",
            CampaignStatus::CompletedWithErrors => "completed_with_errors",
            CampaignStatus::Cancelled => "cancelled",
            CampaignStatus::Stalled => "stalled",
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A campaign: one template dispatched to a fixed recipient list.
///
/// The template reference is immutable after creation. Per-recipient counts
/// are never stored here; they are recomputed from send records (see
/// [`Aggregate`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    /// Unique identifier (UUID).
    pub id: String,
    /// Provider template identifier (Twilio content SID).
    pub template_id: String,
    /// Human-readable template name for display.
    pub template_name: String,
    /// Current aggregate status.
    pub status: CampaignStatus,
    /// Total recipients after deduplication.
    pub total: u32,
    /// When the campaign was created.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Outcome status of a single send record.
///
/// Sent, Failed and Cancelled are terminal; a record transitions out of
/// Pending exactly once. Attempts only increase while Pending.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl SendStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SendStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SendStatus::Pending => "pending",
            SendStatus::Sent => "sent",
            SendStatus::Failed => "failed",
            SendStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-recipient outcome record, keyed by (campaign_id, phone).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendRecord {
    pub campaign_id: String,
    pub phone: String,
    /// Template variables captured at campaign creation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    pub status: SendStatus,
    /// Provider message id, present iff Sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Classified error detail, present iff Failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of gateway attempts made so far.
    pub attempts: u32,
    /// Timestamp of the last attempt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

/// Aggregate counts for a campaign, recomputed from send records.
///
/// Invariant: `sent + failed + pending + cancelled == total`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Aggregate {
    pub sent: u32,
    pub failed: u32,
    pub pending: u32,
    pub cancelled: u32,
    pub total: u32,
}

impl Aggregate {
    /// Returns true when every record has reached a terminal status.
    pub fn is_settled(&self) -> bool {
        self.pending == 0
    }
}
