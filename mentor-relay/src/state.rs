use std::collections::BTreeMap;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::RelayConfig;

/// Default bound on queued events per channel
pub const DEFAULT_MAX_PENDING_PER_CHANNEL: usize = 1000;

type Connection = mpsc::UnboundedSender<String>;

/// Relay state: live connections, channel membership and undelivered events
pub struct RelayState {
    /// user_id -> list of sender channels (supports multiple connections per user)
    pub clients: DashMap<String, Vec<mpsc::UnboundedSender<String>>>,
    /// channel -> user id -> connections subscribed to it
    channels: DashMap<String, BTreeMap<String, Vec<Connection>>>,
    /// channel -> frames waiting for a subscriber
    pending_events: DashMap<String, Vec<String>>,
    access_token: Option<String>,
    max_pending: usize,
}

impl RelayState {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            channels: DashMap::new(),
            pending_events: DashMap::new(),
            access_token: None,
            max_pending: DEFAULT_MAX_PENDING_PER_CHANNEL,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            access_token: config.access_token.clone(),
            max_pending: config.max_pending.max(1),
            ..Self::new()
        }
    }

    /// Shared token every `connect` frame must present, if configured
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Register a new client connection (supports multiple connections per user)
    pub fn add_client(&self, user_id: String, tx: mpsc::UnboundedSender<String>) {
        self.clients.entry(user_id).or_default().push(tx);
    }

    /// Drop closed connections of a user. Returns true once the user has none left.
    pub fn remove_client(&self, user_id: &str) -> bool {
        if let Some(mut entry) = self.clients.get_mut(user_id) {
            entry.retain(|tx| !tx.is_closed());
            if entry.is_empty() {
                drop(entry);
                self.clients.remove(user_id);
                return true;
            }
            return false;
        }
        true
    }

    /// Subscribe one connection of a user to a channel.
    /// Returns true if the user was not yet a member through any connection.
    pub fn subscribe(&self, channel: &str, user_id: &str, conn: &Connection) -> bool {
        let mut members = self.channels.entry(channel.to_string()).or_default();
        let connections = members.entry(user_id.to_string()).or_default();
        connections.retain(|c| !c.is_closed());
        let newly_joined = connections.is_empty();
        if !connections.iter().any(|c| c.same_channel(conn)) {
            connections.push(conn.clone());
        }
        newly_joined
    }

    /// Unsubscribe one connection of a user from a channel.
    /// Returns true only when the user has no subscribed connection left.
    pub fn unsubscribe(&self, channel: &str, user_id: &str, conn: &Connection) -> bool {
        let left = self
            .channels
            .get_mut(channel)
            .map(|mut members| {
                let Some(connections) = members.get_mut(user_id) else {
                    return false;
                };
                connections.retain(|c| !c.same_channel(conn) && !c.is_closed());
                if connections.is_empty() {
                    members.remove(user_id);
                    return true;
                }
                false
            })
            .unwrap_or(false);
        self.channels.remove_if(channel, |_, members| members.is_empty());
        left
    }

    /// Drop the closed connections of a user from every channel,
    /// returning the channels the user no longer belongs to
    pub fn leave_closed(&self, user_id: &str) -> Vec<String> {
        let mut left = Vec::new();
        for mut entry in self.channels.iter_mut() {
            let members = entry.value_mut();
            let Some(connections) = members.get_mut(user_id) else {
                continue;
            };
            connections.retain(|c| !c.is_closed());
            if connections.is_empty() {
                members.remove(user_id);
                left.push(entry.key().clone());
            }
        }
        self.channels.retain(|_, members| !members.is_empty());
        left.sort();
        left
    }

    /// Current members of a channel, sorted
    pub fn members(&self, channel: &str) -> Vec<String> {
        self.channels
            .get(channel)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, channel: &str, user_id: &str) -> bool {
        self.channels
            .get(channel)
            .map(|members| members.contains_key(user_id))
            .unwrap_or(false)
    }

    /// Deliver a frame to every member of a channel except `exclude_user_id`.
    /// Returns the number of users reached.
    pub fn publish(&self, channel: &str, frame: &str, exclude_user_id: Option<&str>) -> usize {
        // Snapshot members so no map guard is held while sending
        let members = self.members(channel);
        members
            .iter()
            .filter(|member| Some(member.as_str()) != exclude_user_id)
            .filter(|member| self.send_to_user(member, frame))
            .count()
    }

    /// Publish to a channel, or queue the frame when nobody is listening.
    /// Returns true if delivered immediately, false if queued.
    pub fn publish_or_queue(&self, channel: &str, frame: &str) -> bool {
        if self.publish(channel, frame, None) > 0 {
            true
        } else {
            self.queue_event(channel, frame.to_string());
            info!(channel = %channel, "Queued event for channel without subscribers");
            false
        }
    }

    /// Queue a frame for a channel without subscribers
    pub fn queue_event(&self, channel: &str, frame: String) {
        let mut entry = self.pending_events.entry(channel.to_string()).or_default();

        // Enforce queue limit - drop oldest if at capacity
        if entry.len() >= self.max_pending {
            entry.remove(0);
            info!(channel = %channel, "Queue limit reached, dropped oldest event");
        }
        entry.push(frame);
    }

    /// Take all pending frames for a channel (clears the queue)
    pub fn take_pending_events(&self, channel: &str) -> Vec<String> {
        self.pending_events
            .remove(channel)
            .map(|(_, frames)| frames)
            .unwrap_or_default()
    }

    pub fn pending_count(&self, channel: &str) -> usize {
        self.pending_events
            .get(channel)
            .map(|frames| frames.len())
            .unwrap_or(0)
    }

    /// Send a frame to a specific user (all their connections)
    pub fn send_to_user(&self, user_id: &str, frame: &str) -> bool {
        if let Some(channels) = self.clients.get(user_id) {
            let mut sent = false;
            for tx in channels.iter() {
                if tx.send(frame.to_string()).is_ok() {
                    sent = true;
                }
            }
            sent
        } else {
            false
        }
    }

    /// Get list of connected user IDs
    pub fn online_users(&self) -> Vec<String> {
        self.clients
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.clients
            .get(user_id)
            .map(|channels| !channels.is_empty())
            .unwrap_or(false)
    }
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}
