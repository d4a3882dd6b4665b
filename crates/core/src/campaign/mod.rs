//! Campaign and send record tracking.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteCampaignStore;
pub use store::{CampaignStore, NewCampaign, StoreError};
pub use types::{Aggregate, Campaign, CampaignStatus, Recipient, SendRecord, SendStatus};
