/// WebSocket handler for real-time chat delivery.
/// Manages client connections, presence, live room membership, and message
/// fan-out. Messages are JSON envelopes discriminated by a "type" field.
///
/// Inbound types: start_private_chat, join_group, join_room, private_message,
/// group_message, room_message, typing_start, typing_stop. The `room` field
/// of typing events is a namespaced room id as produced by `crate::rooms`.

use crate::db::{Database, DbPool, DEFAULT_HISTORY_LIMIT};
use crate::presence::PresenceTracker;
use crate::rooms::{self, RoomRegistry};
use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared real-time state: outbound senders, presence, and live rooms.
/// Created once at process start and injected via `web::Data`.
pub struct ChatServer {
    pub clients: Arc<RwLock<HashMap<String, tokio::sync::mpsc::UnboundedSender<String>>>>,
    pub presence: Arc<RwLock<PresenceTracker>>,
    pub rooms: Arc<RwLock<RoomRegistry>>,
    pub pool: DbPool,
}

impl ChatServer {
    pub fn new(pool: DbPool) -> Self {
        ChatServer {
            clients: Arc::new(RwLock::new(HashMap::new())),
            presence: Arc::new(RwLock::new(PresenceTracker::new())),
            rooms: Arc::new(RwLock::new(RoomRegistry::new())),
            pool,
        }
    }

    /// Deliver an event to a single connection. A closed channel is ignored;
    /// the disconnect path cleans the entry up.
    pub async fn send_to(&self, connection_id: &str, message: &str) {
        let clients = self.clients.read().await;
        if let Some(tx) = clients.get(connection_id) {
            let _ = tx.send(message.to_string());
        }
    }

    /// Deliver an event to every connected client
    pub async fn broadcast_all(&self, message: &str) {
        let clients = self.clients.read().await;
        for tx in clients.values() {
            let _ = tx.send(message.to_string());
        }
    }

    /// Deliver an event to every connection in a room, optionally excluding
    /// one connection (typing indicators exclude the sender; chat messages
    /// include it so the sender sees the server-assigned timestamp echoed)
    pub async fn broadcast_room(&self, room_id: &str, message: &str, exclude: Option<&str>) {
        let members = self.rooms.read().await.members(room_id);
        let clients = self.clients.read().await;
        for member in members {
            if exclude == Some(member.as_str()) {
                continue;
            }
            if let Some(tx) = clients.get(&member) {
                let _ = tx.send(message.to_string());
            }
        }
    }

    /// Distinct usernames currently connected in a room
    async fn room_usernames(&self, room_id: &str) -> Vec<String> {
        let members = self.rooms.read().await.members(room_id);
        let presence = self.presence.read().await;
        let mut users: Vec<String> = members
            .iter()
            .filter_map(|conn| presence.username_of(conn).map(str::to_string))
            .collect();
        users.sort();
        users.dedup();
        users
    }

    async fn broadcast_online_users(&self) {
        let users = self.presence.read().await.online_users();
        self.broadcast_all(&json!({ "type": "online_users_update", "users": users }).to_string())
            .await;
    }

    /// Register a connection: bind presence, refresh last_seen, announce.
    /// `user_online` fires only for the user's first connection.
    pub async fn connect(
        &self,
        connection_id: &str,
        username: &str,
        tx: tokio::sync::mpsc::UnboundedSender<String>,
    ) {
        self.clients
            .write()
            .await
            .insert(connection_id.to_string(), tx);

        let first_connection = {
            let mut presence = self.presence.write().await;
            let was_online = presence.is_online(username);
            presence.bind(connection_id, username);
            !was_online
        };

        if let Err(e) = Database::touch_last_seen(&self.pool, username).await {
            log::error!("Failed to update last_seen for {}: {}", username, e);
        }

        if first_connection {
            self.broadcast_all(&json!({ "type": "user_online", "username": username }).to_string())
                .await;
        }
        self.broadcast_online_users().await;
        log::info!("{} connected as {}", username, connection_id);
    }

    /// Tear down a connection: drop its sender, unbind exactly its presence
    /// entry, leave all rooms, announce. `user_offline` fires only when the
    /// user's last connection goes away.
    pub async fn disconnect(&self, connection_id: &str) {
        self.clients.write().await.remove(connection_id);

        let username = self.presence.write().await.unbind(connection_id);
        let left_rooms = self.rooms.write().await.leave_all(connection_id);

        for room_id in &left_rooms {
            if let Some(name) = room_id.strip_prefix("room:") {
                let users = self.room_usernames(room_id).await;
                self.broadcast_room(
                    room_id,
                    &json!({ "type": "room_users_update", "room": name, "users": users })
                        .to_string(),
                    None,
                )
                .await;
            }
        }

        if let Some(username) = username {
            let still_online = self.presence.read().await.is_online(&username);
            if !still_online {
                self.broadcast_all(
                    &json!({ "type": "user_offline", "username": username }).to_string(),
                )
                .await;
            }
            self.broadcast_online_users().await;
            log::info!("{} disconnected ({})", username, connection_id);
        }
    }

    /// Find or create the private chat with another user, enter its live
    /// room, and send the history to the requester only
    pub async fn start_private_chat(&self, connection_id: &str, other_user: &str) {
        let username = match self.presence.read().await.username_of(connection_id) {
            Some(u) => u.to_string(),
            None => return,
        };

        let chat_id =
            match Database::find_or_create_private_chat(&self.pool, &username, other_user).await {
                Ok(id) => id,
                Err(e) => {
                    log::error!("Failed to open private chat: {}", e);
                    return;
                }
            };

        let history =
            match Database::private_chat_history(&self.pool, chat_id, DEFAULT_HISTORY_LIMIT).await
            {
                Ok(h) => h,
                Err(e) => {
                    log::error!("Failed to load chat history: {}", e);
                    return;
                }
            };

        self.rooms
            .write()
            .await
            .join(&rooms::private_chat_room(chat_id), connection_id);

        self.send_to(
            connection_id,
            &json!({
                "type": "private_chat_history",
                "chat_id": chat_id,
                "other_user": other_user,
                "messages": history
            })
            .to_string(),
        )
        .await;
    }

    /// Enter a group's live room after the persistent-membership gate.
    /// Unknown or foreign group ids silently no-op (stale client state).
    pub async fn join_group(&self, connection_id: &str, group_id: i64) {
        let username = match self.presence.read().await.username_of(connection_id) {
            Some(u) => u.to_string(),
            None => return,
        };

        match Database::is_group_member(&self.pool, group_id, &username).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                log::error!("Failed to check group membership: {}", e);
                return;
            }
        }

        let group = match Database::get_group(&self.pool, group_id).await {
            Ok(Some(g)) => g,
            Ok(None) => return,
            Err(e) => {
                log::error!("Failed to load group: {}", e);
                return;
            }
        };

        let history = match Database::group_history(&self.pool, group_id, DEFAULT_HISTORY_LIMIT)
            .await
        {
            Ok(h) => h,
            Err(e) => {
                log::error!("Failed to load group history: {}", e);
                return;
            }
        };

        self.rooms
            .write()
            .await
            .join(&rooms::group_room(group_id), connection_id);

        self.send_to(
            connection_id,
            &json!({
                "type": "group_chat_history",
                "group_id": group_id,
                "group_name": group.name,
                "messages": history
            })
            .to_string(),
        )
        .await;
    }

    /// Enter a topic room (no persistent membership gate), send its
    /// persisted history to the requester, and update the room's user list
    pub async fn join_topic_room(&self, connection_id: &str, room_name: &str) {
        if self
            .presence
            .read()
            .await
            .username_of(connection_id)
            .is_none()
        {
            return;
        }

        let history = match Database::room_history(&self.pool, room_name, DEFAULT_HISTORY_LIMIT)
            .await
        {
            Ok(h) => h,
            Err(e) => {
                log::error!("Failed to load room history: {}", e);
                return;
            }
        };

        let room_id = rooms::topic_room(room_name);
        self.rooms.write().await.join(&room_id, connection_id);

        self.send_to(
            connection_id,
            &json!({
                "type": "room_history",
                "room": room_name,
                "messages": history
            })
            .to_string(),
        )
        .await;

        let users = self.room_usernames(&room_id).await;
        self.broadcast_room(
            &room_id,
            &json!({ "type": "room_users_update", "room": room_name, "users": users }).to_string(),
            None,
        )
        .await;
    }

    /// Append a private message and echo it to the whole chat room
    pub async fn private_message(&self, connection_id: &str, chat_id: i64, text: &str) {
        let username = match self.presence.read().await.username_of(connection_id) {
            Some(u) => u.to_string(),
            None => return,
        };

        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let message = match Database::add_private_message(&self.pool, chat_id, &username, text)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                log::error!("Failed to store private message: {}", e);
                return;
            }
        };

        self.broadcast_room(
            &rooms::private_chat_room(chat_id),
            &json!({ "type": "new_private_message", "chat_id": chat_id, "message": message })
                .to_string(),
            None,
        )
        .await;
    }

    /// Append a group message and echo it to the whole group room
    pub async fn group_message(&self, connection_id: &str, group_id: i64, text: &str) {
        let username = match self.presence.read().await.username_of(connection_id) {
            Some(u) => u.to_string(),
            None => return,
        };

        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let message = match Database::add_group_message(&self.pool, group_id, &username, text).await
        {
            Ok(m) => m,
            Err(e) => {
                log::error!("Failed to store group message: {}", e);
                return;
            }
        };

        self.broadcast_room(
            &rooms::group_room(group_id),
            &json!({ "type": "new_group_message", "group_id": group_id, "message": message })
                .to_string(),
            None,
        )
        .await;
    }

    /// Append a topic-room message (write-ahead, one row per message) and
    /// echo it to the room
    pub async fn room_message(&self, connection_id: &str, room_name: &str, text: &str) {
        let username = match self.presence.read().await.username_of(connection_id) {
            Some(u) => u.to_string(),
            None => return,
        };

        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let message = match Database::add_room_message(&self.pool, room_name, &username, text).await
        {
            Ok(m) => m,
            Err(e) => {
                log::error!("Failed to store room message: {}", e);
                return;
            }
        };

        self.broadcast_room(
            &rooms::topic_room(room_name),
            &json!({ "type": "new_room_message", "room": room_name, "message": message })
                .to_string(),
            None,
        )
        .await;
    }

    /// Broadcast a typing indicator to a room, excluding the sender
    pub async fn typing(&self, connection_id: &str, room_id: &str, started: bool) {
        let username = match self.presence.read().await.username_of(connection_id) {
            Some(u) => u.to_string(),
            None => return,
        };

        let event_type = if started { "user_typing" } else { "user_stop_typing" };
        self.broadcast_room(
            room_id,
            &json!({ "type": event_type, "room": room_id, "username": username }).to_string(),
            Some(connection_id),
        )
        .await;
    }
}

/// WebSocket actor for individual client connections
pub struct WsSession {
    pub connection_id: String,
    pub username: String,
    pub server: web::Data<ChatServer>,
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        log::info!("WebSocket connection started: {}", self.connection_id);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let addr = ctx.address();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                addr.do_send(OutboundEvent(msg));
            }
        });

        let server = self.server.clone();
        let connection_id = self.connection_id.clone();
        let username = self.username.clone();
        let fut = async move {
            server.connect(&connection_id, &username, tx).await;
        };
        let _ = actix::spawn(fut);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        log::info!("WebSocket connection stopped: {}", self.connection_id);
        let server = self.server.clone();
        let connection_id = self.connection_id.clone();
        let fut = async move {
            server.disconnect(&connection_id).await;
        };
        let _ = actix::spawn(fut);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(value) => self.dispatch(value),
                Err(e) => {
                    log::error!("Failed to parse WebSocket message: {}", e);
                    ctx.text(
                        json!({
                            "error": "Invalid message format"
                        })
                        .to_string(),
                    );
                }
            },
            Ok(ws::Message::Close(_)) => {
                ctx.stop();
            }
            Err(e) => {
                log::error!("WebSocket error: {}", e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

impl WsSession {
    fn dispatch(&self, value: serde_json::Value) {
        let msg_type = match value.get("type").and_then(|t| t.as_str()) {
            Some(t) => t.to_string(),
            None => {
                log::warn!("WebSocket message without type field");
                return;
            }
        };

        let server = self.server.clone();
        let connection_id = self.connection_id.clone();

        actix::spawn(async move {
            match msg_type.as_str() {
                "start_private_chat" => {
                    if let Some(other_user) = value.get("other_user").and_then(|v| v.as_str()) {
                        server.start_private_chat(&connection_id, other_user).await;
                    }
                }
                "join_group" => {
                    if let Some(group_id) = value.get("group_id").and_then(|v| v.as_i64()) {
                        server.join_group(&connection_id, group_id).await;
                    }
                }
                "join_room" => {
                    if let Some(room) = value.get("room").and_then(|v| v.as_str()) {
                        server.join_topic_room(&connection_id, room).await;
                    }
                }
                "private_message" => {
                    if let (Some(chat_id), Some(text)) = (
                        value.get("chat_id").and_then(|v| v.as_i64()),
                        value.get("text").and_then(|v| v.as_str()),
                    ) {
                        server.private_message(&connection_id, chat_id, text).await;
                    }
                }
                "group_message" => {
                    if let (Some(group_id), Some(text)) = (
                        value.get("group_id").and_then(|v| v.as_i64()),
                        value.get("text").and_then(|v| v.as_str()),
                    ) {
                        server.group_message(&connection_id, group_id, text).await;
                    }
                }
                "room_message" => {
                    if let (Some(room), Some(text)) = (
                        value.get("room").and_then(|v| v.as_str()),
                        value.get("text").and_then(|v| v.as_str()),
                    ) {
                        server.room_message(&connection_id, room, text).await;
                    }
                }
                "typing_start" => {
                    if let Some(room) = value.get("room").and_then(|v| v.as_str()) {
                        server.typing(&connection_id, room, true).await;
                    }
                }
                "typing_stop" => {
                    if let Some(room) = value.get("room").and_then(|v| v.as_str()) {
                        server.typing(&connection_id, room, false).await;
                    }
                }
                other => {
                    log::warn!("Unknown message type: {}", other);
                }
            }
        });
    }
}

#[derive(Message)]
#[rtype(result = "()")]
struct OutboundEvent(String);

impl Handler<OutboundEvent> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: OutboundEvent, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

/// WebSocket connection handler
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    username: web::Path<String>,
    server: web::Data<ChatServer>,
) -> actix_web::Result<HttpResponse> {
    let connection_id = format!("{}_{}", username, uuid::Uuid::new_v4());

    let session = WsSession {
        connection_id,
        username: username.into_inner(),
        server: server.clone(),
    };

    let resp = ws::start(session, &req, stream)?;
    Ok(resp)
}
