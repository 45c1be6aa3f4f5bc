mod conversation;
pub mod input;
mod message;
mod user;

pub use conversation::{Conversation, NewMessage, StoredMessage};
pub use message::{DeliveryStatus, Message};
pub use user::{Role, SessionUser, User};
