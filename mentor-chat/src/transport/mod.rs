//! Realtime transport seam.
//!
//! A transport owns one connection to the publish/subscribe service. Inbound
//! traffic is pushed as `TransportEvent`s onto the queue returned by
//! `connect`; only (channel, event) pairs registered with `bind` are
//! forwarded.

mod frames;
mod memory;
mod ws;

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use tokio::sync::mpsc;

use crate::error::ChatResult;
use crate::events::{MEMBER_ADDED, MEMBER_REMOVED, SUBSCRIPTION_SUCCEEDED};

pub use frames::RelayFrame;
pub use memory::{MemoryHandle, MemoryTransport, TransportLog, Triggered};
pub use ws::WsTransport;

pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    SubscriptionSucceeded {
        channel: String,
        members: Vec<String>,
    },
    MemberAdded {
        channel: String,
        user_id: String,
    },
    MemberRemoved {
        channel: String,
        user_id: String,
    },
    Event {
        channel: String,
        event: String,
        data: serde_json::Value,
    },
}

impl TransportEvent {
    pub fn channel(&self) -> &str {
        match self {
            TransportEvent::SubscriptionSucceeded { channel, .. }
            | TransportEvent::MemberAdded { channel, .. }
            | TransportEvent::MemberRemoved { channel, .. }
            | TransportEvent::Event { channel, .. } => channel,
        }
    }

    /// Name a binding has to match
    pub fn name(&self) -> &str {
        match self {
            TransportEvent::SubscriptionSucceeded { .. } => SUBSCRIPTION_SUCCEEDED,
            TransportEvent::MemberAdded { .. } => MEMBER_ADDED,
            TransportEvent::MemberRemoved { .. } => MEMBER_REMOVED,
            TransportEvent::Event { event, .. } => event,
        }
    }
}

pub trait Transport {
    /// Open the connection for `user_id`. Events arrive on the returned queue.
    fn connect(&mut self, user_id: &str) -> ChatResult<EventReceiver>;

    fn subscribe(&mut self, channel: &str) -> ChatResult<()>;

    /// Forward `event` on `channel` to the event queue
    fn bind(&mut self, channel: &str, event: &str);

    fn trigger(&self, channel: &str, event: &str, data: serde_json::Value) -> ChatResult<()>;

    /// Close the connection. Safe to call when not connected.
    fn disconnect(&mut self);
}

/// Registered (channel, event) pairs, shared with a transport's reader task
#[derive(Debug, Clone, Default)]
pub struct Bindings(Arc<StdMutex<HashSet<(String, String)>>>);

impl Bindings {
    fn lock(&self) -> MutexGuard<'_, HashSet<(String, String)>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns false if the pair was already bound
    pub fn bind(&self, channel: &str, event: &str) -> bool {
        self.lock().insert((channel.to_string(), event.to_string()))
    }

    pub fn allows(&self, event: &TransportEvent) -> bool {
        self.lock()
            .contains(&(event.channel().to_string(), event.name().to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
