pub mod campaign;
pub mod config;
pub mod dispatcher;
pub mod metrics;
pub mod provider;
pub mod roster;
pub mod status;
pub mod testing;

pub use campaign::{
    Aggregate, Campaign, CampaignStatus, CampaignStore, NewCampaign, Recipient, SendRecord,
    SendStatus, SqliteCampaignStore, StoreError,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
    TwilioConfig,
};
pub use dispatcher::{
    CampaignDispatcher, CancelHandle, DispatchError, DispatchSummary, DispatcherConfig,
};
pub use provider::{
    ErrorKind, ProviderError, ProviderGateway, ProviderMessageId, SendRequest, TwilioGateway,
};
pub use roster::{load_csv, RosterError};
pub use status::{resolve_status, snapshot, CampaignSnapshot};
