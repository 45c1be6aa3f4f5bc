//! Client session controller.
//!
//! A session is DISCONNECTED until `start` finds an authenticated user, which
//! binds the realtime channels and creates the `ChatState`. `stop` (or drop)
//! tears the connection down and discards the state.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::backend::ChatBackend;
use crate::binder::ChannelBinder;
use crate::config::ChatConfig;
use crate::error::{ChatError, ChatResult};
use crate::events::ChatEvent;
use crate::identity::IdentityProvider;
use crate::models::{DeliveryStatus, Message, NewMessage, SessionUser};
use crate::state::{ChatState, Notification};
use crate::transport::Transport;
use crate::utils::now_millis;

const MIN_TYPING_SWEEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
}

pub struct ChatSession<T: Transport, B: ChatBackend> {
    binder: ChannelBinder<T>,
    backend: B,
    typing_ttl: Duration,
    user: Option<SessionUser>,
    state: Option<ChatState>,
}

impl<T: Transport, B: ChatBackend> ChatSession<T, B> {
    pub fn new(transport: T, backend: B, config: &ChatConfig) -> Self {
        Self {
            binder: ChannelBinder::new(transport, config.presence_channel.clone()),
            backend,
            typing_ttl: config.typing_ttl,
            user: None,
            state: None,
        }
    }

    pub fn session_state(&self) -> SessionState {
        if self.state.is_some() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session_state() == SessionState::Connected
    }

    /// DISCONNECTED -> CONNECTED for the identity's current user.
    /// Returns `Ok(false)` when already connected.
    pub fn start<I: IdentityProvider>(&mut self, identity: &I) -> ChatResult<bool> {
        if self.is_connected() {
            debug!("Session already connected");
            return Ok(false);
        }
        let user = identity.current_user().ok_or(ChatError::Unauthorized)?;

        self.binder.init(&user.id)?;
        self.state = Some(ChatState::new(user.id.clone(), self.typing_ttl));
        info!(user_id = %user.id, "Chat session connected");
        self.user = Some(user);
        Ok(true)
    }

    /// CONNECTED -> DISCONNECTED. Safe to call repeatedly.
    pub fn stop(&mut self) -> bool {
        let was_connected = self.state.take().is_some();
        self.binder.teardown();
        if let Some(user) = self.user.take() {
            info!(user_id = %user.id, "Chat session disconnected");
        }
        was_connected
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.user.as_ref()
    }

    pub fn state(&self) -> Option<&ChatState> {
        self.state.as_ref()
    }

    pub fn state_mut(&mut self) -> Option<&mut ChatState> {
        self.state.as_mut()
    }

    pub fn binder(&self) -> &ChannelBinder<T> {
        &self.binder
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn connected(&self) -> ChatResult<(&SessionUser, &ChatState)> {
        match (&self.user, &self.state) {
            (Some(user), Some(state)) => Ok((user, state)),
            _ => Err(ChatError::Unauthorized),
        }
    }

    fn connected_state(&mut self) -> ChatResult<&mut ChatState> {
        self.state.as_mut().ok_or(ChatError::Unauthorized)
    }

    /// Fetch the users this session can chat with
    pub async fn load_roster(&mut self) -> ChatResult<usize> {
        let (user, _) = self.connected()?;
        let users = self.backend.fetch_users(user).await?;
        let count = users.len();
        self.connected_state()?.presence_mut().set_roster(users);
        debug!(count, "Roster loaded");
        Ok(count)
    }

    /// Replace all conversations with the persisted history of every roster user
    pub async fn load_history(&mut self) -> ChatResult<()> {
        let (user, state) = self.connected()?;
        let local_id = user.id.clone();
        let counterparts: Vec<String> = state
            .presence()
            .users()
            .iter()
            .map(|u| u.id.clone())
            .collect();

        let mut history = HashMap::new();
        for counterpart in counterparts {
            let Some(conversation) = self
                .backend
                .find_conversation(&local_id, &counterpart)
                .await?
            else {
                continue;
            };
            let messages = self
                .backend
                .fetch_messages(&conversation.id)
                .await?
                .into_iter()
                .map(|stored| {
                    let recipient = if stored.sender_id == local_id {
                        counterpart.as_str()
                    } else {
                        local_id.as_str()
                    };
                    Message::from_stored(stored, recipient, &local_id)
                })
                .collect();
            history.insert(counterpart, messages);
        }

        self.connected_state()?.conversations_mut().replace_all(history);
        Ok(())
    }

    /// Optimistic half of a send: the message is visible with status
    /// `Sending` as soon as this returns
    pub fn begin_send(&mut self, recipient_id: &str, content: &str) -> ChatResult<Message> {
        if content.trim().is_empty() {
            return Err(ChatError::BadRequest("Message cannot be blank".to_string()));
        }
        let state = self.connected_state()?;
        Ok(state
            .conversations_mut()
            .insert_optimistic(recipient_id, content, now_millis()))
    }

    /// Persist and publish a message from `begin_send`. On failure the
    /// optimistic entry is marked failed and a notification is queued.
    pub async fn complete_send(&mut self, pending: &Message) -> ChatResult<Message> {
        let correlation_id = pending
            .correlation_id
            .clone()
            .ok_or_else(|| ChatError::Internal("Pending message has no correlation id".to_string()))?;
        let recipient_id = pending.recipient_id.clone();

        match self.deliver(pending).await {
            Ok(confirmed) => {
                let state = self.connected_state()?;
                state
                    .conversations_mut()
                    .confirm(&recipient_id, &correlation_id, confirmed.clone());
                Ok(confirmed)
            }
            Err(e) => {
                warn!(recipient_id = %recipient_id, error = %e, "Send failed");
                if let Some(state) = self.state.as_mut() {
                    state
                        .conversations_mut()
                        .mark_failed(&recipient_id, &correlation_id);
                    state.notify(Notification::SendFailed {
                        counterpart_id: recipient_id,
                        correlation_id,
                        reason: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    async fn deliver(&self, pending: &Message) -> ChatResult<Message> {
        let (user, _) = self.connected()?;
        let conversation = self
            .backend
            .get_or_create_conversation(&user.id, &pending.recipient_id)
            .await?;
        let stored = self
            .backend
            .create_message(NewMessage {
                conversation_id: conversation.id,
                sender_id: user.id.clone(),
                body: pending.content.clone(),
                correlation_id: pending.correlation_id.clone(),
            })
            .await?;
        let confirmed = Message::from_stored(stored, &pending.recipient_id, &user.id);

        // Persisted already; the recipient gets it with their next history load
        if let Err(e) = self.binder.publish_message(&confirmed) {
            warn!(message_id = %confirmed.id, error = %e, "Realtime delivery failed");
        }
        Ok(confirmed)
    }

    pub async fn send_message(&mut self, recipient_id: &str, content: &str) -> ChatResult<Message> {
        let pending = self.begin_send(recipient_id, content)?;
        self.complete_send(&pending).await
    }

    /// Send a failed message again. The failed entry is replaced by a fresh
    /// send at the end of the conversation.
    pub async fn resend(&mut self, recipient_id: &str, message_id: &str) -> ChatResult<Message> {
        let state = self.connected_state()?;
        let failed = state
            .conversations()
            .find(recipient_id, message_id)
            .ok_or_else(|| ChatError::NotFound("Message".to_string()))?;
        if failed.status != DeliveryStatus::Failed {
            return Err(ChatError::BadRequest("Only failed messages can be resent".to_string()));
        }
        let content = failed.content.clone();
        state.conversations_mut().remove(recipient_id, message_id);
        self.send_message(recipient_id, &content).await
    }

    pub fn set_typing(&self, recipient_id: &str, is_typing: bool) -> ChatResult<()> {
        let (user, _) = self.connected()?;
        self.binder.publish_typing(&user.id, recipient_id, is_typing)
    }

    pub fn select(&mut self, counterpart_id: Option<&str>) -> ChatResult<()> {
        self.connected_state()?.select(counterpart_id);
        Ok(())
    }

    fn apply(&mut self, event: ChatEvent) {
        if let Some(state) = self.state.as_mut() {
            state.apply(event, Instant::now(), now_millis());
        }
    }

    /// Apply every event already queued. Returns how many were applied.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.binder.try_next() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Wait for one event and apply it. False once the connection is gone.
    pub async fn process_next(&mut self) -> bool {
        match self.binder.next().await {
            Some(event) => {
                self.apply(event);
                true
            }
            None => false,
        }
    }

    /// Dispatch loop: applies events in delivery order and expires typing
    /// indicators until `shutdown` flips to true or the connection closes
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut sweep = tokio::time::interval((self.typing_ttl / 2).max(MIN_TYPING_SWEEP));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Dispatch loop shutting down");
                        break;
                    }
                }
                event = self.binder.next() => {
                    match event {
                        Some(event) => {
                            if let Some(state) = self.state.as_mut() {
                                state.apply(event, Instant::now(), now_millis());
                            }
                        }
                        None => {
                            info!("Event queue closed");
                            break;
                        }
                    }
                }
                _ = sweep.tick() => {
                    if let Some(state) = self.state.as_mut() {
                        let cleared = state.sweep_typing(Instant::now());
                        if !cleared.is_empty() {
                            debug!(users = ?cleared, "Typing indicators expired");
                        }
                    }
                }
            }
        }
    }
}

impl<T: Transport, B: ChatBackend> Drop for ChatSession<T, B> {
    fn drop(&mut self) {
        self.binder.teardown();
    }
}
