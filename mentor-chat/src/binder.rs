use tracing::{debug, info, warn};

use crate::error::ChatResult;
use crate::events::{
    private_user_channel, ChatEvent, MessagePayload, TypingPayload, MEMBER_ADDED, MEMBER_REMOVED,
    MESSAGE_EVENT, SUBSCRIPTION_SUCCEEDED, TYPING_EVENT,
};
use crate::models::Message;
use crate::transport::{EventReceiver, Transport};

/// Holds the single realtime connection of a session and its channel
/// bindings. Inbound traffic is read back as `ChatEvent`s.
pub struct ChannelBinder<T: Transport> {
    transport: T,
    presence_channel: String,
    receiver: Option<EventReceiver>,
}

impl<T: Transport> ChannelBinder<T> {
    pub fn new(transport: T, presence_channel: impl Into<String>) -> Self {
        Self {
            transport,
            presence_channel: presence_channel.into(),
            receiver: None,
        }
    }

    /// Connect and bind the user's private channel and the presence channel.
    /// Returns `Ok(false)` without touching the transport when already
    /// connected.
    pub fn init(&mut self, user_id: &str) -> ChatResult<bool> {
        if self.receiver.is_some() {
            debug!(user_id = %user_id, "Channels already bound");
            return Ok(false);
        }

        let receiver = self.transport.connect(user_id)?;
        let private = private_user_channel(user_id);

        // Bind before subscribing so the presence snapshot is not missed
        self.transport.bind(&private, MESSAGE_EVENT);
        self.transport.bind(&private, TYPING_EVENT);
        self.transport.bind(&self.presence_channel, SUBSCRIPTION_SUCCEEDED);
        self.transport.bind(&self.presence_channel, MEMBER_ADDED);
        self.transport.bind(&self.presence_channel, MEMBER_REMOVED);

        let subscribed = self
            .transport
            .subscribe(&private)
            .and_then(|_| self.transport.subscribe(&self.presence_channel));
        if let Err(e) = subscribed {
            warn!(user_id = %user_id, error = %e, "Channel subscription failed");
            self.transport.disconnect();
            return Err(e);
        }

        self.receiver = Some(receiver);
        info!(user_id = %user_id, channel = %private, "Channels bound");
        Ok(true)
    }

    pub fn is_connected(&self) -> bool {
        self.receiver.is_some()
    }

    /// Disconnect and drop the event queue. Returns false when nothing was
    /// connected.
    pub fn teardown(&mut self) -> bool {
        if self.receiver.take().is_none() {
            return false;
        }
        self.transport.disconnect();
        info!("Channels torn down");
        true
    }

    /// Next decoded event if one is already queued
    pub fn try_next(&mut self) -> Option<ChatEvent> {
        let receiver = self.receiver.as_mut()?;
        while let Ok(event) = receiver.try_recv() {
            if let Some(event) = ChatEvent::decode(event, &self.presence_channel) {
                return Some(event);
            }
        }
        None
    }

    /// Wait for the next decoded event. `None` once the queue is closed or
    /// nothing is connected.
    pub async fn next(&mut self) -> Option<ChatEvent> {
        let receiver = self.receiver.as_mut()?;
        while let Some(event) = receiver.recv().await {
            if let Some(event) = ChatEvent::decode(event, &self.presence_channel) {
                return Some(event);
            }
        }
        None
    }

    /// Deliver `message` to the recipient's private channel
    pub fn publish_message(&self, message: &Message) -> ChatResult<()> {
        let payload = serde_json::to_value(MessagePayload::from_message(message))?;
        self.transport.trigger(
            &private_user_channel(&message.recipient_id),
            MESSAGE_EVENT,
            payload,
        )
    }

    pub fn publish_typing(&self, local_user_id: &str, recipient_id: &str, is_typing: bool) -> ChatResult<()> {
        let payload = serde_json::to_value(TypingPayload {
            user_id: local_user_id.to_string(),
            is_typing,
        })?;
        self.transport
            .trigger(&private_user_channel(recipient_id), TYPING_EVENT, payload)
    }

    pub fn presence_channel(&self) -> &str {
        &self.presence_channel
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
