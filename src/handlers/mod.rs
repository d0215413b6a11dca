/// HTTP handlers module
/// Provides REST and WebSocket endpoints

pub mod rest;
pub mod websocket;

pub use rest::{
    create_group, get_profile, health, list_user_chats, list_user_groups, list_users, login,
    register,
};
pub use websocket::{ws_connect, ChatServer};
