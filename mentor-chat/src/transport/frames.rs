use serde::{Deserialize, Serialize};

use super::TransportEvent;

/// Relay protocol frames, as spoken by the mentor relay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayFrame {
    #[serde(rename = "connect")]
    Connect {
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    #[serde(rename = "auth_response")]
    AuthResponse { success: bool, message: String },
    #[serde(rename = "subscribe")]
    Subscribe { channel: String },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { channel: String },
    #[serde(rename = "subscription_succeeded")]
    SubscriptionSucceeded {
        channel: String,
        #[serde(default)]
        members: Vec<String>,
    },
    #[serde(rename = "subscription_error")]
    SubscriptionError { channel: String, message: String },
    #[serde(rename = "member_added")]
    MemberAdded { channel: String, user_id: String },
    #[serde(rename = "member_removed")]
    MemberRemoved { channel: String, user_id: String },
    #[serde(rename = "trigger")]
    Trigger {
        channel: String,
        event: String,
        data: serde_json::Value,
    },
    #[serde(rename = "event")]
    Event {
        channel: String,
        event: String,
        sender_id: String,
        data: serde_json::Value,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

impl RelayFrame {
    /// The inbound frames that carry channel traffic
    pub fn into_transport_event(self) -> Option<TransportEvent> {
        match self {
            RelayFrame::SubscriptionSucceeded { channel, members } => {
                Some(TransportEvent::SubscriptionSucceeded { channel, members })
            }
            RelayFrame::MemberAdded { channel, user_id } => {
                Some(TransportEvent::MemberAdded { channel, user_id })
            }
            RelayFrame::MemberRemoved { channel, user_id } => {
                Some(TransportEvent::MemberRemoved { channel, user_id })
            }
            RelayFrame::Event {
                channel,
                event,
                data,
                ..
            } => Some(TransportEvent::Event {
                channel,
                event,
                data,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connect_serialization() {
        let msg = RelayFrame::Connect {
            user_id: "user123".to_string(),
            token: Some("secret".to_string()),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"connect\""));
        assert!(json.contains("\"user_id\":\"user123\""));
        assert!(json.contains("\"token\":\"secret\""));
    }

    #[test]
    fn test_event_frame_to_transport_event() {
        let json = r#"{"type":"event","channel":"private-user-U1","event":"message","sender_id":"U2","data":{"id":"m1"}}"#;
        let frame: RelayFrame = serde_json::from_str(json).unwrap();
        assert_eq!(
            frame.into_transport_event(),
            Some(TransportEvent::Event {
                channel: "private-user-U1".into(),
                event: "message".into(),
                data: json!({"id": "m1"}),
            })
        );
    }

    #[test]
    fn test_control_frames_are_not_channel_traffic() {
        let frame = RelayFrame::AuthResponse {
            success: true,
            message: "ok".into(),
        };
        assert!(frame.into_transport_event().is_none());

        let frame = RelayFrame::SubscriptionError {
            channel: "private-user-U2".into(),
            message: "no".into(),
        };
        assert!(frame.into_transport_event().is_none());
    }
}
