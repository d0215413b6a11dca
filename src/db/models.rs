/// Data models for database operations.
/// Represents users, private chats, groups, and chat messages.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub joined_date: String,
    pub last_seen: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateChat {
    pub id: i64,
    pub user1: String,
    pub user2: String,
    pub created_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub admin: String,
    pub created_date: String,
}

/// One entry of a chat history, shared by private chats, groups, and topic
/// rooms. Timestamps are server-assigned RFC 3339 strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub username: String,
    pub text: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSummary {
    pub username: String,
    pub last_seen: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrivateChatSummary {
    pub chat_id: i64,
    pub other_user: String,
    pub last_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupSummary {
    pub group_id: i64,
    pub name: String,
    pub admin: String,
    pub member_count: i64,
}

// Request/Response DTOs
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub admin: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateGroupResponse {
    pub group_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub username: String,
    pub joined_date: String,
    pub last_seen: String,
    pub private_chats_count: usize,
    pub groups_count: usize,
    pub contacts_count: usize,
}
