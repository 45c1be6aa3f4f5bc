//! Online/offline tracking for the local roster.
//!
//! Every handler is idempotent and ignores ids that are not in the roster.
//! `last_seen` is stamped only when a user goes from online to offline.

use std::collections::HashSet;

use tracing::debug;

use crate::models::User;

#[derive(Debug, Default)]
pub struct PresenceTracker {
    users: Vec<User>,
    /// Current channel membership, roster or not
    members: HashSet<String>,
}

impl PresenceTracker {
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users,
            members: HashSet::new(),
        }
    }

    /// Replace the roster, e.g. after the initial user fetch. Users already
    /// seen in the presence channel come in online.
    pub fn set_roster(&mut self, users: Vec<User>) {
        self.users = users;
        for user in self.users.iter_mut() {
            user.is_online = self.members.contains(&user.id);
        }
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn user(&self, user_id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == user_id)
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.user(user_id).map(|u| u.is_online).unwrap_or(false)
    }

    pub fn online_ids(&self) -> Vec<String> {
        self.users
            .iter()
            .filter(|u| u.is_online)
            .map(|u| u.id.clone())
            .collect()
    }

    /// Full membership after subscribing: online iff present in `members`
    pub fn apply_snapshot(&mut self, members: &[String], now_ms: i64) {
        self.members = members.iter().cloned().collect();
        for user in self.users.iter_mut() {
            set_online(user, self.members.contains(&user.id), now_ms);
        }
        debug!(online = self.members.len(), "Applied presence snapshot");
    }

    pub fn member_added(&mut self, user_id: &str) {
        self.members.insert(user_id.to_string());
        match self.users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => set_online(user, true, 0),
            None => debug!(user_id = %user_id, "Ignoring presence for unknown user"),
        }
    }

    pub fn member_removed(&mut self, user_id: &str, now_ms: i64) {
        self.members.remove(user_id);
        match self.users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => set_online(user, false, now_ms),
            None => debug!(user_id = %user_id, "Ignoring presence for unknown user"),
        }
    }
}

fn set_online(user: &mut User, online: bool, now_ms: i64) {
    if user.is_online && !online {
        user.last_seen = Some(now_ms);
    }
    user.is_online = online;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(ids: &[&str]) -> PresenceTracker {
        PresenceTracker::new(ids.iter().map(|id| User::new(*id, *id)).collect())
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_snapshot_marks_exact_member_set() {
        let mut presence = roster(&["U1", "U2", "U3", "U4"]);
        presence.member_added("U1");

        presence.apply_snapshot(&ids(&["U2", "U3"]), 1_000);

        assert_eq!(presence.online_ids(), ids(&["U2", "U3"]));
        assert!(!presence.is_online("U1"));
        assert!(!presence.is_online("U4"));
        // U1 went offline through the snapshot, U4 was never online
        assert_eq!(presence.user("U1").unwrap().last_seen, Some(1_000));
        assert_eq!(presence.user("U4").unwrap().last_seen, None);
    }

    #[test]
    fn test_snapshot_ignores_unknown_members() {
        let mut presence = roster(&["U1"]);
        presence.apply_snapshot(&ids(&["U1", "stranger"]), 0);
        assert_eq!(presence.online_ids(), ids(&["U1"]));
        assert_eq!(presence.users().len(), 1);
    }

    #[test]
    fn test_member_removed_stamps_last_seen_once() {
        let mut presence = roster(&["U1"]);
        presence.member_added("U1");

        presence.member_removed("U1", 500);
        presence.member_removed("U1", 900);

        let user = presence.user("U1").unwrap();
        assert!(!user.is_online);
        assert_eq!(user.last_seen, Some(500));
    }

    #[test]
    fn test_member_added_is_idempotent() {
        let mut presence = roster(&["U1", "U2"]);
        presence.member_added("U2");
        let once = presence.users().to_vec();
        presence.member_added("U2");
        assert_eq!(presence.users(), once.as_slice());
    }

    #[test]
    fn test_unknown_ids_are_ignored() {
        let mut presence = roster(&["U1"]);
        presence.member_added("ghost");
        presence.member_removed("ghost", 1);
        assert!(presence.online_ids().is_empty());
        assert!(presence.user("ghost").is_none());
    }

    #[test]
    fn test_replay_final_event_wins() {
        // (user, added?) in delivery order
        let events = [
            ("U1", true),
            ("U2", true),
            ("U1", false),
            ("U3", true),
            ("U2", false),
            ("U2", true),
            ("U3", false),
            ("U3", false),
        ];
        let mut presence = roster(&["U1", "U2", "U3"]);
        for (i, (id, added)) in events.iter().enumerate() {
            if *added {
                presence.member_added(id);
            } else {
                presence.member_removed(id, i as i64);
            }
        }

        for id in ["U1", "U2", "U3"] {
            let last = events.iter().rev().find(|(u, _)| *u == id).map(|(_, a)| *a);
            assert_eq!(presence.is_online(id), last.unwrap(), "user {}", id);
        }

        // Replaying the final event again changes nothing
        let before = presence.users().to_vec();
        presence.member_removed("U3", 99);
        assert_eq!(presence.users(), before.as_slice());
    }

    #[test]
    fn test_roster_loaded_after_snapshot() {
        let mut presence = PresenceTracker::default();
        presence.apply_snapshot(&ids(&["U2"]), 0);
        presence.member_added("U3");
        presence.member_removed("U2", 5);
        presence.member_added("U4");

        presence.set_roster(vec![
            User::new("U2", "Two"),
            User::new("U3", "Three"),
            User::new("U5", "Five"),
        ]);
        assert_eq!(presence.online_ids(), ids(&["U3"]));
    }

    #[test]
    fn test_set_roster_replaces_users() {
        let mut presence = roster(&["U1"]);
        presence.set_roster(vec![User::new("U9", "Nine")]);
        assert!(presence.user("U1").is_none());
        assert_eq!(presence.user("U9").unwrap().name, "Nine");
    }
}
