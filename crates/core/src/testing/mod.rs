//! Test doubles shared across the crate and integration tests.

mod faulty_store;
mod mock_gateway;

pub use faulty_store::FaultyStore;
pub use mock_gateway::{MockGateway, RecordedSend};
