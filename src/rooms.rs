/// Live room membership: room id -> set of connection ids.
///
/// Rooms here are purely transient fan-out groups; persistent membership
/// (group rosters, private-chat pairs) lives in the database and must be
/// checked by callers before a join is allowed. Room ids are namespaced by
/// the constructors below so chat, group, and topic ids cannot collide.
use std::collections::{HashMap, HashSet};

pub fn private_chat_room(chat_id: i64) -> String {
    format!("chat:{}", chat_id)
}

pub fn group_room(group_id: i64) -> String {
    format!("group:{}", group_id)
}

pub fn topic_room(name: &str) -> String {
    format!("room:{}", name)
}

#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, HashSet<String>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    pub fn join(&mut self, room_id: &str, connection_id: &str) {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
    }

    /// Remove a connection from one room. An empty live set is kept around;
    /// the room itself is backed by persistent state or is a named topic.
    pub fn leave(&mut self, room_id: &str, connection_id: &str) {
        if let Some(members) = self.rooms.get_mut(room_id) {
            members.remove(connection_id);
        }
    }

    /// Remove a connection from every room, returning the rooms it was in
    pub fn leave_all(&mut self, connection_id: &str) -> Vec<String> {
        let mut left = Vec::new();
        for (room_id, members) in self.rooms.iter_mut() {
            if members.remove(connection_id) {
                left.push(room_id.clone());
            }
        }
        left
    }

    /// Connection ids currently in a room; empty for unknown rooms
    pub fn members(&self, room_id: &str) -> Vec<String> {
        self.rooms
            .get(room_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, room_id: &str, connection_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|members| members.contains(connection_id))
    }
}
