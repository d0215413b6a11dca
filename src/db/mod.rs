/// Database layer for persistent storage.
/// Handles all database operations for users, private chats, groups, and
/// topic-room message logs.

pub mod init;
pub mod models;

use chrono::Utc;
use models::{ChatMessage, Group, GroupSummary, PrivateChatSummary, User, UserSummary};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::auth;

pub type DbPool = Arc<Mutex<Connection>>;

/// Default number of history entries returned to a joining client.
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// Preview text for conversations that have no messages yet.
pub const NO_MESSAGES_PLACEHOLDER: &str = "No messages yet";

/// Create a connection pool (simplified for single-threaded SQLite)
pub fn create_pool(db_path: &str) -> SqliteResult<DbPool> {
    let conn = Connection::open(db_path)?;
    init::initialize_database(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Create an in-memory database for testing
pub fn create_test_pool() -> DbPool {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory DB");
    init::initialize_database(&conn).expect("Failed to initialize DB");
    Arc::new(Mutex::new(conn))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Database operations
pub struct Database;

impl Database {
    // ==================== users ====================

    /// Insert a new user row. Returns `false` when the username is already
    /// taken; any other failure is a real persistence error.
    pub async fn create_user(
        pool: &DbPool,
        username: &str,
        password_hash: &str,
    ) -> SqliteResult<bool> {
        let conn = pool.lock().await;
        let now = Utc::now().to_rfc3339();

        let inserted = conn.execute(
            "INSERT INTO users (username, password_hash, joined_date, last_seen) VALUES (?1, ?2, ?3, ?4)",
            params![username, password_hash, &now, &now],
        );

        match inserted {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Get user by username
    pub async fn get_user(pool: &DbPool, username: &str) -> SqliteResult<Option<User>> {
        let conn = pool.lock().await;

        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, joined_date, last_seen FROM users WHERE username = ?1",
        )?;

        let user = stmt
            .query_row(params![username], |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                    joined_date: row.get(3)?,
                    last_seen: row.get(4)?,
                })
            })
            .optional()?;

        Ok(user)
    }

    /// Check a username/password pair against the stored hash.
    ///
    /// Absent users and mismatched passwords both come back as `false`; a
    /// successful verification updates `last_seen` as a side effect.
    pub async fn verify_user(pool: &DbPool, username: &str, password: &str) -> SqliteResult<bool> {
        let user = match Self::get_user(pool, username).await? {
            Some(u) => u,
            None => return Ok(false),
        };

        let verified = match auth::verify_password(password, &user.password_hash) {
            Ok(v) => v,
            Err(e) => {
                // A stored hash that fails to parse can never match.
                log::error!("Unusable password hash for {}: {}", username, e);
                false
            }
        };

        if verified {
            Self::touch_last_seen(pool, username).await?;
        }

        Ok(verified)
    }

    /// Unconditionally set a user's last_seen to now
    pub async fn touch_last_seen(pool: &DbPool, username: &str) -> SqliteResult<()> {
        let conn = pool.lock().await;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "UPDATE users SET last_seen = ?1 WHERE username = ?2",
            params![&now, username],
        )?;

        Ok(())
    }

    /// List all registered users with their last_seen timestamps
    pub async fn list_users(pool: &DbPool) -> SqliteResult<Vec<UserSummary>> {
        let conn = pool.lock().await;

        let mut stmt = conn.prepare("SELECT username, last_seen FROM users")?;
        let users = stmt
            .query_map([], |row| {
                Ok(UserSummary {
                    username: row.get(0)?,
                    last_seen: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    // ==================== private chats ====================

    fn lookup_private_chat(
        conn: &Connection,
        user_a: &str,
        user_b: &str,
    ) -> SqliteResult<Option<i64>> {
        conn.query_row(
            "SELECT id FROM private_chats
             WHERE (user1 = ?1 AND user2 = ?2) OR (user1 = ?2 AND user2 = ?1)",
            params![user_a, user_b],
            |row| row.get(0),
        )
        .optional()
    }

    /// Find the private chat for an unordered pair of users, creating it on
    /// first contact. Idempotent; a lost unique-constraint race falls back to
    /// the lookup instead of failing.
    pub async fn find_or_create_private_chat(
        pool: &DbPool,
        user_a: &str,
        user_b: &str,
    ) -> SqliteResult<i64> {
        let conn = pool.lock().await;

        if let Some(id) = Self::lookup_private_chat(&conn, user_a, user_b)? {
            return Ok(id);
        }

        let created = Utc::now().to_rfc3339();
        let inserted = conn.execute(
            "INSERT INTO private_chats (user1, user2, created_date) VALUES (?1, ?2, ?3)",
            params![user_a, user_b, &created],
        );

        match inserted {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => {
                Self::lookup_private_chat(&conn, user_a, user_b)?.ok_or(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Append a message to a private chat with a server-assigned timestamp.
    ///
    /// Accepts any text; empty-after-trim rejection is the caller's job and
    /// is enforced at the WebSocket boundary.
    pub async fn add_private_message(
        pool: &DbPool,
        chat_id: i64,
        username: &str,
        text: &str,
    ) -> SqliteResult<ChatMessage> {
        let conn = pool.lock().await;
        let timestamp = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO private_messages (chat_id, username, message_text, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![chat_id, username, text, &timestamp],
        )?;

        Ok(ChatMessage {
            username: username.to_string(),
            text: text.to_string(),
            timestamp,
        })
    }

    /// Most recent `limit` messages of a private chat, oldest first
    pub async fn private_chat_history(
        pool: &DbPool,
        chat_id: i64,
        limit: i64,
    ) -> SqliteResult<Vec<ChatMessage>> {
        let conn = pool.lock().await;

        let mut stmt = conn.prepare(
            "SELECT username, message_text, timestamp FROM private_messages
             WHERE chat_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;

        let mut messages = stmt
            .query_map(params![chat_id, limit], |row| {
                Ok(ChatMessage {
                    username: row.get(0)?,
                    text: row.get(1)?,
                    timestamp: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        // Fetched newest-first; the external contract is oldest-first.
        messages.reverse();
        Ok(messages)
    }

    /// All private chats touching a user, with the counterpart identity and
    /// the latest message text as a preview
    pub async fn list_user_private_chats(
        pool: &DbPool,
        username: &str,
    ) -> SqliteResult<Vec<PrivateChatSummary>> {
        let conn = pool.lock().await;

        let mut stmt = conn.prepare(
            "SELECT pc.id,
                    CASE WHEN pc.user1 = ?1 THEN pc.user2 ELSE pc.user1 END AS other_user,
                    (SELECT message_text FROM private_messages
                     WHERE chat_id = pc.id
                     ORDER BY timestamp DESC, id DESC LIMIT 1) AS last_message
             FROM private_chats pc
             WHERE pc.user1 = ?1 OR pc.user2 = ?1",
        )?;

        let chats = stmt
            .query_map(params![username], |row| {
                Ok(PrivateChatSummary {
                    chat_id: row.get(0)?,
                    other_user: row.get(1)?,
                    last_message: row
                        .get::<_, Option<String>>(2)?
                        .unwrap_or_else(|| NO_MESSAGES_PLACEHOLDER.to_string()),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(chats)
    }

    // ==================== groups ====================

    /// Create a group with its initial member roster in one transaction.
    ///
    /// The admin is always enrolled; duplicate entries in `members` are
    /// tolerated silently. Any unexpected failure rolls the whole operation
    /// back, leaving no partial state behind.
    pub async fn create_group(
        pool: &DbPool,
        name: &str,
        admin: &str,
        members: &[String],
    ) -> SqliteResult<i64> {
        let mut conn = pool.lock().await;
        let now = Utc::now().to_rfc3339();

        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO groups (name, admin, created_date) VALUES (?1, ?2, ?3)",
            params![name, admin, &now],
        )?;
        let group_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT OR IGNORE INTO group_members (group_id, username, joined_date) VALUES (?1, ?2, ?3)",
            params![group_id, admin, &now],
        )?;
        for member in members {
            tx.execute(
                "INSERT OR IGNORE INTO group_members (group_id, username, joined_date) VALUES (?1, ?2, ?3)",
                params![group_id, member, &now],
            )?;
        }

        tx.commit()?;
        Ok(group_id)
    }

    /// Get group by id
    pub async fn get_group(pool: &DbPool, group_id: i64) -> SqliteResult<Option<Group>> {
        let conn = pool.lock().await;

        let mut stmt =
            conn.prepare("SELECT id, name, admin, created_date FROM groups WHERE id = ?1")?;

        let group = stmt
            .query_row(params![group_id], |row| {
                Ok(Group {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    admin: row.get(2)?,
                    created_date: row.get(3)?,
                })
            })
            .optional()?;

        Ok(group)
    }

    /// Whether a user has a membership row in a group
    pub async fn is_group_member(
        pool: &DbPool,
        group_id: i64,
        username: &str,
    ) -> SqliteResult<bool> {
        let conn = pool.lock().await;

        let member: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM group_members WHERE group_id = ?1 AND username = ?2",
                params![group_id, username],
                |row| row.get(0),
            )
            .optional()?;

        Ok(member.is_some())
    }

    /// Append a message to a group with a server-assigned timestamp
    pub async fn add_group_message(
        pool: &DbPool,
        group_id: i64,
        username: &str,
        text: &str,
    ) -> SqliteResult<ChatMessage> {
        let conn = pool.lock().await;
        let timestamp = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO group_messages (group_id, username, message_text, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![group_id, username, text, &timestamp],
        )?;

        Ok(ChatMessage {
            username: username.to_string(),
            text: text.to_string(),
            timestamp,
        })
    }

    /// Most recent `limit` messages of a group, oldest first
    pub async fn group_history(
        pool: &DbPool,
        group_id: i64,
        limit: i64,
    ) -> SqliteResult<Vec<ChatMessage>> {
        let conn = pool.lock().await;

        let mut stmt = conn.prepare(
            "SELECT username, message_text, timestamp FROM group_messages
             WHERE group_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;

        let mut messages = stmt
            .query_map(params![group_id, limit], |row| {
                Ok(ChatMessage {
                    username: row.get(0)?,
                    text: row.get(1)?,
                    timestamp: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        messages.reverse();
        Ok(messages)
    }

    /// All groups where a user holds a membership row
    pub async fn list_user_groups(
        pool: &DbPool,
        username: &str,
    ) -> SqliteResult<Vec<GroupSummary>> {
        let conn = pool.lock().await;

        let mut stmt = conn.prepare(
            "SELECT g.id, g.name, g.admin,
                    (SELECT COUNT(*) FROM group_members WHERE group_id = g.id) AS member_count
             FROM groups g
             JOIN group_members gm ON g.id = gm.group_id
             WHERE gm.username = ?1",
        )?;

        let groups = stmt
            .query_map(params![username], |row| {
                Ok(GroupSummary {
                    group_id: row.get(0)?,
                    name: row.get(1)?,
                    admin: row.get(2)?,
                    member_count: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(groups)
    }

    // ==================== topic rooms ====================

    /// Append a topic-room message. One INSERT per message; topic rooms have
    /// no roster table, only this write-ahead message log.
    pub async fn add_room_message(
        pool: &DbPool,
        room: &str,
        username: &str,
        text: &str,
    ) -> SqliteResult<ChatMessage> {
        let conn = pool.lock().await;
        let timestamp = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO room_messages (room, username, message_text, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![room, username, text, &timestamp],
        )?;

        Ok(ChatMessage {
            username: username.to_string(),
            text: text.to_string(),
            timestamp,
        })
    }

    /// Most recent `limit` messages of a topic room, oldest first
    pub async fn room_history(
        pool: &DbPool,
        room: &str,
        limit: i64,
    ) -> SqliteResult<Vec<ChatMessage>> {
        let conn = pool.lock().await;

        let mut stmt = conn.prepare(
            "SELECT username, message_text, timestamp FROM room_messages
             WHERE room = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;

        let mut messages = stmt
            .query_map(params![room, limit], |row| {
                Ok(ChatMessage {
                    username: row.get(0)?,
                    text: row.get(1)?,
                    timestamp: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        messages.reverse();
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_user() {
        let pool = create_test_pool();
        let created = Database::create_user(&pool, "alice", "hash1")
            .await
            .expect("Failed to create user");
        assert!(created);

        let user = Database::get_user(&pool, "alice")
            .await
            .expect("Query failed")
            .expect("User not found");
        assert_eq!(user.username, "alice");
        assert_eq!(user.password_hash, "hash1");
        assert!(user.id > 0);
        assert_eq!(user.joined_date, user.last_seen);
    }

    #[tokio::test]
    async fn test_duplicate_username_is_sentinel_not_error() {
        let pool = create_test_pool();
        assert!(Database::create_user(&pool, "alice", "hash1")
            .await
            .expect("First create failed"));

        // Same username, different hash: still refused
        let taken = Database::create_user(&pool, "alice", "hash2")
            .await
            .expect("Duplicate create should not be an error");
        assert!(!taken);
    }

    #[tokio::test]
    async fn test_get_nonexistent_user() {
        let pool = create_test_pool();
        let user = Database::get_user(&pool, "nonexistent")
            .await
            .expect("Query failed");
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn test_verify_user_roundtrip() {
        let pool = create_test_pool();
        let hash = auth::hash_password("secret1").expect("Hashing failed");
        Database::create_user(&pool, "alice", &hash)
            .await
            .expect("Failed to create user");

        assert!(Database::verify_user(&pool, "alice", "secret1")
            .await
            .expect("Verify failed"));
        assert!(!Database::verify_user(&pool, "alice", "Secret1")
            .await
            .expect("Verify failed"));
        assert!(!Database::verify_user(&pool, "nonexistent", "secret1")
            .await
            .expect("Verify failed"));
    }

    #[tokio::test]
    async fn test_verify_updates_last_seen() {
        let pool = create_test_pool();
        let hash = auth::hash_password("secret1").expect("Hashing failed");
        Database::create_user(&pool, "alice", &hash)
            .await
            .expect("Failed to create user");

        let before = Database::get_user(&pool, "alice")
            .await
            .expect("Query failed")
            .expect("User not found");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        assert!(Database::verify_user(&pool, "alice", "secret1")
            .await
            .expect("Verify failed"));

        let after = Database::get_user(&pool, "alice")
            .await
            .expect("Query failed")
            .expect("User not found");
        assert!(after.last_seen > before.last_seen);
    }

    #[tokio::test]
    async fn test_list_users() {
        let pool = create_test_pool();
        Database::create_user(&pool, "alice", "h1").await.expect("create failed");
        Database::create_user(&pool, "bob", "h2").await.expect("create failed");

        let users = Database::list_users(&pool).await.expect("List failed");
        assert_eq!(users.len(), 2);
        let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
        assert!(names.contains(&"alice"));
        assert!(names.contains(&"bob"));
    }

    #[tokio::test]
    async fn test_find_or_create_private_chat_is_symmetric() {
        let pool = create_test_pool();

        let id1 = Database::find_or_create_private_chat(&pool, "alice", "bob")
            .await
            .expect("Create failed");
        let id2 = Database::find_or_create_private_chat(&pool, "bob", "alice")
            .await
            .expect("Lookup failed");
        let id3 = Database::find_or_create_private_chat(&pool, "alice", "bob")
            .await
            .expect("Lookup failed");

        assert_eq!(id1, id2);
        assert_eq!(id1, id3);
    }

    #[tokio::test]
    async fn test_private_history_limit_and_order() {
        let pool = create_test_pool();
        let chat_id = Database::find_or_create_private_chat(&pool, "alice", "bob")
            .await
            .expect("Create failed");

        for i in 1..=5 {
            Database::add_private_message(&pool, chat_id, "alice", &format!("msg{}", i))
                .await
                .expect("Append failed");
        }

        let history = Database::private_chat_history(&pool, chat_id, 2)
            .await
            .expect("History failed");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "msg4");
        assert_eq!(history[1].text, "msg5");
    }

    #[tokio::test]
    async fn test_private_chat_preview() {
        let pool = create_test_pool();
        let chat_id = Database::find_or_create_private_chat(&pool, "alice", "bob")
            .await
            .expect("Create failed");

        let empty = Database::list_user_private_chats(&pool, "alice")
            .await
            .expect("List failed");
        assert_eq!(empty[0].last_message, NO_MESSAGES_PLACEHOLDER);

        Database::add_private_message(&pool, chat_id, "alice", "hi bob")
            .await
            .expect("Append failed");

        for user in ["alice", "bob"] {
            let chats = Database::list_user_private_chats(&pool, user)
                .await
                .expect("List failed");
            assert_eq!(chats.len(), 1);
            assert_eq!(chats[0].chat_id, chat_id);
            assert_eq!(chats[0].last_message, "hi bob");
        }
        let alice_chats = Database::list_user_private_chats(&pool, "alice")
            .await
            .expect("List failed");
        assert_eq!(alice_chats[0].other_user, "bob");
    }

    #[tokio::test]
    async fn test_create_group_with_members() {
        let pool = create_test_pool();

        let group_id = Database::create_group(
            &pool,
            "team",
            "alice",
            &["bob".to_string(), "carol".to_string()],
        )
        .await
        .expect("Create failed");

        let groups = Database::list_user_groups(&pool, "bob")
            .await
            .expect("List failed");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group_id, group_id);
        assert_eq!(groups[0].name, "team");
        assert_eq!(groups[0].admin, "alice");
        assert_eq!(groups[0].member_count, 3);
    }

    #[tokio::test]
    async fn test_create_group_tolerates_duplicate_members() {
        let pool = create_test_pool();

        // Admin repeated in the member list and bob listed twice
        let group_id = Database::create_group(
            &pool,
            "team",
            "alice",
            &["alice".to_string(), "bob".to_string(), "bob".to_string()],
        )
        .await
        .expect("Create failed");

        let groups = Database::list_user_groups(&pool, "alice")
            .await
            .expect("List failed");
        assert_eq!(groups[0].group_id, group_id);
        assert_eq!(groups[0].member_count, 2);
    }

    #[tokio::test]
    async fn test_group_membership_gate() {
        let pool = create_test_pool();
        let group_id = Database::create_group(&pool, "team", "alice", &["bob".to_string()])
            .await
            .expect("Create failed");

        assert!(Database::is_group_member(&pool, group_id, "alice")
            .await
            .expect("Query failed"));
        assert!(Database::is_group_member(&pool, group_id, "bob")
            .await
            .expect("Query failed"));
        assert!(!Database::is_group_member(&pool, group_id, "carol")
            .await
            .expect("Query failed"));
        assert!(!Database::is_group_member(&pool, 999, "alice")
            .await
            .expect("Query failed"));
    }

    #[tokio::test]
    async fn test_group_history() {
        let pool = create_test_pool();
        let group_id = Database::create_group(&pool, "team", "alice", &["bob".to_string()])
            .await
            .expect("Create failed");

        Database::add_group_message(&pool, group_id, "alice", "hello team")
            .await
            .expect("Append failed");
        Database::add_group_message(&pool, group_id, "bob", "hi alice")
            .await
            .expect("Append failed");

        let history = Database::group_history(&pool, group_id, DEFAULT_HISTORY_LIMIT)
            .await
            .expect("History failed");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].username, "alice");
        assert_eq!(history[1].username, "bob");
    }

    #[tokio::test]
    async fn test_room_messages_persist() {
        let pool = create_test_pool();

        Database::add_room_message(&pool, "general", "alice", "first")
            .await
            .expect("Append failed");
        Database::add_room_message(&pool, "general", "bob", "second")
            .await
            .expect("Append failed");
        Database::add_room_message(&pool, "random", "carol", "elsewhere")
            .await
            .expect("Append failed");

        let history = Database::room_history(&pool, "general", DEFAULT_HISTORY_LIMIT)
            .await
            .expect("History failed");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "first");
        assert_eq!(history[1].text, "second");
    }
}
