//! Realtime chat core of the mentor chat platform: presence, channel
//! bindings, conversation state and the session that owns them, plus the
//! persistence and request-handling collaborators behind the chat API.

pub mod api;
pub mod backend;
pub mod binder;
pub mod config;
pub mod conversation;
pub mod db;
pub mod error;
pub mod events;
pub mod identity;
pub mod logging;
pub mod models;
pub mod presence;
pub mod rate_limit;
pub mod session;
pub mod state;
pub mod transport;
pub mod typing;
pub mod utils;

pub use backend::ChatBackend;
pub use binder::ChannelBinder;
pub use config::ChatConfig;
pub use db::Database;
pub use error::{ChatError, ChatResult};
pub use events::ChatEvent;
pub use identity::{IdentityProvider, StaticIdentity};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use session::{ChatSession, SessionState};
pub use state::{ChatState, Notification};
pub use transport::{MemoryTransport, Transport, TransportEvent, WsTransport};
