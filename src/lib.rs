/// Chat server library.
///
/// Real-time group/private chat: user accounts with hashed credentials,
/// private 1:1 chats, named groups with persistent rosters, and topic rooms,
/// all backed by SQLite, with presence and message fan-out over WebSockets.

pub mod auth;
pub mod config;
pub mod db;
pub mod handlers;
pub mod presence;
pub mod rooms;
pub mod server;
