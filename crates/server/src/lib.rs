//! HTTP server for the megaphone campaign dispatch service.
//!
//! Exposed as a library so integration tests can build the router
//! in-process without binding a socket.

pub mod api;
pub mod metrics;
pub mod state;

pub use api::create_router;
pub use state::AppState;
