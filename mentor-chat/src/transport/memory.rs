use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::debug;

use super::{Bindings, EventReceiver, Transport, TransportEvent};
use crate::error::{ChatError, ChatResult};

/// A trigger the transport accepted
#[derive(Debug, Clone, PartialEq)]
pub struct Triggered {
    pub channel: String,
    pub event: String,
    pub data: serde_json::Value,
}

/// Every call made against a `MemoryTransport`, in order
#[derive(Debug, Clone, Default)]
pub struct TransportLog {
    pub connects: Vec<String>,
    pub subscriptions: Vec<String>,
    pub binds: Vec<(String, String)>,
    pub triggers: Vec<Triggered>,
    pub disconnects: usize,
}

#[derive(Default)]
struct Shared {
    inbox: Option<mpsc::UnboundedSender<TransportEvent>>,
    fail_triggers: bool,
    log: TransportLog,
}

/// In-process transport. Events are injected through a `MemoryHandle`.
#[derive(Default)]
pub struct MemoryTransport {
    shared: Arc<StdMutex<Shared>>,
    bindings: Bindings,
}

/// Test-side view of a `MemoryTransport`
#[derive(Clone)]
pub struct MemoryHandle {
    shared: Arc<StdMutex<Shared>>,
    bindings: Bindings,
}

fn lock(shared: &StdMutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle {
            shared: self.shared.clone(),
            bindings: self.bindings.clone(),
        }
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self, user_id: &str) -> ChatResult<EventReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut shared = lock(&self.shared);
        shared.inbox = Some(tx);
        shared.log.connects.push(user_id.to_string());
        Ok(rx)
    }

    fn subscribe(&mut self, channel: &str) -> ChatResult<()> {
        let mut shared = lock(&self.shared);
        if shared.inbox.is_none() {
            return Err(ChatError::Transient("Not connected".to_string()));
        }
        shared.log.subscriptions.push(channel.to_string());
        Ok(())
    }

    fn bind(&mut self, channel: &str, event: &str) {
        self.bindings.bind(channel, event);
        lock(&self.shared)
            .log
            .binds
            .push((channel.to_string(), event.to_string()));
    }

    fn trigger(&self, channel: &str, event: &str, data: serde_json::Value) -> ChatResult<()> {
        let mut shared = lock(&self.shared);
        if shared.inbox.is_none() || shared.fail_triggers {
            return Err(ChatError::Transient("Not connected".to_string()));
        }
        shared.log.triggers.push(Triggered {
            channel: channel.to_string(),
            event: event.to_string(),
            data,
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut shared = lock(&self.shared);
        if shared.inbox.take().is_some() {
            shared.log.disconnects += 1;
        }
        drop(shared);
        self.bindings.clear();
    }
}

impl MemoryHandle {
    /// Push an event to the consumer. Returns false when it is unbound or
    /// nothing is connected.
    pub fn deliver(&self, event: TransportEvent) -> bool {
        if !self.bindings.allows(&event) {
            debug!(channel = event.channel(), event = event.name(), "Dropping unbound event");
            return false;
        }
        match lock(&self.shared).inbox.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn log(&self) -> TransportLog {
        lock(&self.shared).log.clone()
    }

    /// Number of times (channel, event) was bound
    pub fn bind_count(&self, channel: &str, event: &str) -> usize {
        lock(&self.shared)
            .log
            .binds
            .iter()
            .filter(|(c, e)| c == channel && e == event)
            .count()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.shared).inbox.is_some()
    }

    /// Make every following trigger fail as a network error would
    pub fn set_fail_triggers(&self, fail: bool) {
        lock(&self.shared).fail_triggers = fail;
    }
}
