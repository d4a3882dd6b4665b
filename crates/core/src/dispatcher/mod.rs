//! Campaign dispatch: worker pool, retry policy and rate limiting.

mod config;
mod engine;
mod rate_limiter;
mod types;

pub use config::DispatcherConfig;
pub use engine::CampaignDispatcher;
pub use rate_limiter::RateLimiter;
pub use types::{CancelHandle, DispatchError, DispatchSummary};
