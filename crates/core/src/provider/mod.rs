//! Provider gateway abstraction over the external messaging API.

mod twilio;
mod types;

pub use twilio::{clean_provider_error, TwilioGateway};
pub use types::{ErrorKind, ProviderError, ProviderGateway, ProviderMessageId, SendRequest};
