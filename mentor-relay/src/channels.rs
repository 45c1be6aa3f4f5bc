//! Channel naming and subscription authorization.

pub const PRIVATE_USER_PREFIX: &str = "private-user-";
pub const PRESENCE_PREFIX: &str = "presence-";

/// Events clients are allowed to trigger
pub const MESSAGE_EVENT: &str = "message";
pub const TYPING_EVENT: &str = "typing";

const MAX_CHANNEL_NAME_LENGTH: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelKind<'a> {
    /// Per-user inbox, readable only by its owner
    PrivateUser(&'a str),
    /// Membership is tracked and exposed to subscribers
    Presence,
    Public,
}

impl<'a> ChannelKind<'a> {
    pub fn parse(channel: &'a str) -> Self {
        if let Some(owner) = channel.strip_prefix(PRIVATE_USER_PREFIX) {
            ChannelKind::PrivateUser(owner)
        } else if channel.starts_with(PRESENCE_PREFIX) {
            ChannelKind::Presence
        } else {
            ChannelKind::Public
        }
    }
}

pub fn private_user_channel(user_id: &str) -> String {
    format!("{}{}", PRIVATE_USER_PREFIX, user_id)
}

/// Check whether `user_id` may subscribe to `channel`
pub fn authorize_subscription(user_id: &str, channel: &str) -> Result<(), String> {
    validate_channel_name(channel)?;
    match ChannelKind::parse(channel) {
        ChannelKind::PrivateUser(owner) if owner != user_id => {
            Err(format!("Not authorized for channel {}", channel))
        }
        _ => Ok(()),
    }
}

/// Check whether `user_id` may trigger `event` on `channel`
pub fn authorize_trigger(user_id: &str, channel: &str, event: &str) -> Result<(), String> {
    validate_channel_name(channel)?;
    if event != MESSAGE_EVENT && event != TYPING_EVENT {
        return Err(format!("Event {} cannot be triggered by clients", event));
    }
    match ChannelKind::parse(channel) {
        ChannelKind::PrivateUser(owner) if owner.is_empty() || owner == user_id => {
            // Our own inbox is fed by echoes only
            Err(format!("Cannot trigger on channel {}", channel))
        }
        ChannelKind::PrivateUser(_) => Ok(()),
        ChannelKind::Presence if event == TYPING_EVENT => Ok(()),
        _ => Err(format!("Cannot trigger {} on channel {}", event, channel)),
    }
}

fn validate_channel_name(channel: &str) -> Result<(), String> {
    if channel.is_empty() {
        return Err("Channel name cannot be empty".to_string());
    }
    if channel.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err(format!(
            "Channel name too long (max {} characters)",
            MAX_CHANNEL_NAME_LENGTH
        ));
    }
    if channel.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err("Channel name contains invalid characters".to_string());
    }
    Ok(())
}
