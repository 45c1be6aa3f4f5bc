//! Mentor chat relay
//!
//! A small publish/subscribe service: named channels, presence membership,
//! owner-only private channels and queued delivery of chat messages to
//! offline subscribers. The modules are exposed for integration tests.

pub mod channels;
mod config;
mod connection;
mod messages;
mod server;
mod state;

pub use config::RelayConfig;
pub use connection::{handle_connection, handle_frame};
pub use messages::RelayFrame;
pub use server::serve;
pub use state::RelayState;
