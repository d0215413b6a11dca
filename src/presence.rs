/// Presence tracking: which connections currently carry which identity.
///
/// Keyed by connection id so a user may hold several simultaneous
/// connections; "online" means at least one connection is bound to the
/// username. Entries live exactly as long as the connection and are never a
/// source of truth for conversation membership.
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct PresenceTracker {
    entries: HashMap<String, String>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Bind a connection to an authenticated identity
    pub fn bind(&mut self, connection_id: &str, username: &str) {
        self.entries
            .insert(connection_id.to_string(), username.to_string());
    }

    /// Remove exactly the entry for this connection, returning the username
    /// it carried. Other connections of the same user are untouched.
    pub fn unbind(&mut self, connection_id: &str) -> Option<String> {
        self.entries.remove(connection_id)
    }

    pub fn username_of(&self, connection_id: &str) -> Option<&str> {
        self.entries.get(connection_id).map(String::as_str)
    }

    /// Whether any connection is currently bound to this username
    pub fn is_online(&self, username: &str) -> bool {
        self.entries.values().any(|u| u == username)
    }

    /// Distinct online usernames, sorted for stable output
    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.entries.values().cloned().collect();
        users.sort();
        users.dedup();
        users
    }

    pub fn connection_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_unbind() {
        let mut presence = PresenceTracker::new();
        presence.bind("conn1", "alice");

        assert_eq!(presence.username_of("conn1"), Some("alice"));
        assert!(presence.is_online("alice"));

        assert_eq!(presence.unbind("conn1"), Some("alice".to_string()));
        assert!(!presence.is_online("alice"));
        assert_eq!(presence.unbind("conn1"), None);
    }

    #[test]
    fn test_unbind_removes_exactly_one_connection() {
        let mut presence = PresenceTracker::new();
        presence.bind("conn1", "alice");
        presence.bind("conn2", "alice");
        presence.bind("conn3", "bob");

        presence.unbind("conn1");

        // alice is still online through conn2, bob untouched
        assert!(presence.is_online("alice"));
        assert_eq!(presence.username_of("conn2"), Some("alice"));
        assert!(presence.is_online("bob"));
        assert_eq!(presence.connection_count(), 2);
    }

    #[test]
    fn test_online_users_deduplicates() {
        let mut presence = PresenceTracker::new();
        presence.bind("conn1", "alice");
        presence.bind("conn2", "alice");
        presence.bind("conn3", "bob");

        assert_eq!(presence.online_users(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_unknown_connection_is_noop() {
        let mut presence = PresenceTracker::new();
        assert_eq!(presence.username_of("ghost"), None);
        assert_eq!(presence.unbind("ghost"), None);
        assert!(presence.online_users().is_empty());
    }
}
