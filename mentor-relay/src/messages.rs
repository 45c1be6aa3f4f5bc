use serde::{Deserialize, Serialize};

/// Relay protocol frames (shared between relay and clients)
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
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize relay frame");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connect_without_token() {
        let json = r#"{"type":"connect","user_id":"abc-123"}"#;
        let msg: RelayFrame = serde_json::from_str(json).unwrap();
        if let RelayFrame::Connect { user_id, token } = msg {
            assert_eq!(user_id, "abc-123");
            assert!(token.is_none());
        } else {
            panic!("Expected Connect");
        }

        // Token is omitted from the wire when absent
        let out = RelayFrame::Connect {
            user_id: "u1".to_string(),
            token: None,
        }
        .to_json()
        .unwrap();
        assert!(!out.contains("token"));
    }

    #[test]
    fn test_subscription_succeeded_members() {
        let msg = RelayFrame::SubscriptionSucceeded {
            channel: "presence-chat".to_string(),
            members: vec!["u1".to_string(), "u2".to_string()],
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"subscription_succeeded\""));
        assert!(json.contains("\"members\":[\"u1\",\"u2\"]"));

        // Members default to empty for private channels
        let parsed: RelayFrame =
            serde_json::from_str(r#"{"type":"subscription_succeeded","channel":"private-user-u1"}"#)
                .unwrap();
        if let RelayFrame::SubscriptionSucceeded { members, .. } = parsed {
            assert!(members.is_empty());
        } else {
            panic!("Expected SubscriptionSucceeded");
        }
    }

    #[test]
    fn test_trigger_carries_arbitrary_payload() {
        let json = r#"{"type":"trigger","channel":"private-user-u2","event":"typing","data":{"user_id":"u1","is_typing":true}}"#;
        let msg: RelayFrame = serde_json::from_str(json).unwrap();
        if let RelayFrame::Trigger {
            channel,
            event,
            data,
        } = msg
        {
            assert_eq!(channel, "private-user-u2");
            assert_eq!(event, "typing");
            assert_eq!(data, json!({"user_id": "u1", "is_typing": true}));
        } else {
            panic!("Expected Trigger");
        }
    }

    #[test]
    fn test_event_serialization() {
        let msg = RelayFrame::Event {
            channel: "private-user-u2".to_string(),
            event: "message".to_string(),
            sender_id: "u1".to_string(),
            data: json!({"content": "hi"}),
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"event\""));
        assert!(json.contains("\"sender_id\":\"u1\""));
        assert!(json.contains("\"content\":\"hi\""));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"type":"call_invite","to_user_id":"u2"}"#;
        assert!(serde_json::from_str::<RelayFrame>(json).is_err());
    }
}
