use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Mentee,
    Mentor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Mentee => "MENTEE",
            Role::Mentor => "MENTOR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "MENTEE" => Some(Role::Mentee),
            "MENTOR" => Some(Role::Mentor),
            _ => None,
        }
    }
}

/// A roster entry. `is_online` and `last_seen` only change through presence events.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    pub last_seen: Option<i64>,
    #[serde(default)]
    pub interested_in: Vec<String>,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            avatar_url: None,
            is_online: false,
            last_seen: None,
            interested_in: Vec::new(),
        }
    }
}

/// The authenticated local user, as reported by the identity provider
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub interested_in: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_format() {
        assert_eq!(serde_json::to_string(&Role::Mentee).unwrap(), "\"MENTEE\"");
        assert_eq!(Role::parse("MENTOR"), Some(Role::Mentor));
        assert_eq!(Role::parse("mentor"), None);
        assert_eq!(Role::Mentee.as_str(), "MENTEE");
    }

    #[test]
    fn test_user_defaults_offline() {
        let user: User = serde_json::from_str(r#"{"id":"u1","name":"Ada","avatar_url":null,"last_seen":null}"#).unwrap();
        assert!(!user.is_online);
        assert!(user.interested_in.is_empty());
        assert_eq!(user, User::new("u1", "Ada"));
    }
}
