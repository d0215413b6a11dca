/// Database schema initialization.
/// Sets up SQLite WAL mode and creates tables on startup.
use rusqlite::{Connection, Result as SqliteResult};

/// Initialize database connection with WAL mode and schema
pub fn initialize_database(conn: &Connection) -> SqliteResult<()> {
    // Enable WAL mode (for file-based DB only, ignore error for in-memory)
    let _ = conn.execute("PRAGMA journal_mode = WAL", []);
    let _ = conn.execute("PRAGMA synchronous = NORMAL", []);

    create_schema(conn)?;

    Ok(())
}

/// Create all database tables
fn create_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            username TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            joined_date TEXT NOT NULL,
            last_seen TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS private_chats (
            id INTEGER PRIMARY KEY,
            user1 TEXT NOT NULL,
            user2 TEXT NOT NULL,
            created_date TEXT NOT NULL,
            UNIQUE(user1, user2)
        );

        CREATE TABLE IF NOT EXISTS private_messages (
            id INTEGER PRIMARY KEY,
            chat_id INTEGER NOT NULL,
            username TEXT NOT NULL,
            message_text TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            FOREIGN KEY(chat_id) REFERENCES private_chats(id)
        );

        CREATE TABLE IF NOT EXISTS groups (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            admin TEXT NOT NULL,
            created_date TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS group_members (
            id INTEGER PRIMARY KEY,
            group_id INTEGER NOT NULL,
            username TEXT NOT NULL,
            joined_date TEXT NOT NULL,
            UNIQUE(group_id, username),
            FOREIGN KEY(group_id) REFERENCES groups(id)
        );

        CREATE TABLE IF NOT EXISTS group_messages (
            id INTEGER PRIMARY KEY,
            group_id INTEGER NOT NULL,
            username TEXT NOT NULL,
            message_text TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            FOREIGN KEY(group_id) REFERENCES groups(id)
        );

        CREATE TABLE IF NOT EXISTS room_messages (
            id INTEGER PRIMARY KEY,
            room TEXT NOT NULL,
            username TEXT NOT NULL,
            message_text TEXT NOT NULL,
            timestamp TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_private_messages_chat ON private_messages(chat_id);
        CREATE INDEX IF NOT EXISTS idx_group_messages_group ON group_messages(group_id);
        CREATE INDEX IF NOT EXISTS idx_group_members_user ON group_members(username);
        CREATE INDEX IF NOT EXISTS idx_room_messages_room ON room_messages(room);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_initialize_in_memory_database() {
        let conn = Connection::open_in_memory().expect("Failed to open in-memory DB");
        initialize_database(&conn).expect("Failed to initialize DB");

        // Verify tables exist
        let tables: Vec<String> = conn
            .prepare(
                "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            )
            .expect("Query failed")
            .query_map([], |row| row.get(0))
            .expect("Mapping failed")
            .collect::<Result<Vec<_>, _>>()
            .expect("Collection failed");

        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"private_chats".to_string()));
        assert!(tables.contains(&"private_messages".to_string()));
        assert!(tables.contains(&"groups".to_string()));
        assert!(tables.contains(&"group_members".to_string()));
        assert!(tables.contains(&"group_messages".to_string()));
        assert!(tables.contains(&"room_messages".to_string()));
    }

    #[test]
    fn test_users_table_schema() {
        let conn = Connection::open_in_memory().expect("Failed to open in-memory DB");
        initialize_database(&conn).expect("Failed to initialize DB");

        let mut stmt = conn
            .prepare("PRAGMA table_info(users)")
            .expect("Query failed");
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("Mapping failed")
            .collect::<Result<Vec<_>, _>>()
            .expect("Collection failed");

        assert!(columns.contains(&"id".to_string()));
        assert!(columns.contains(&"username".to_string()));
        assert!(columns.contains(&"password_hash".to_string()));
        assert!(columns.contains(&"joined_date".to_string()));
        assert!(columns.contains(&"last_seen".to_string()));
    }

    #[test]
    fn test_unique_pair_constraint_exists() {
        let conn = Connection::open_in_memory().expect("Failed to open in-memory DB");
        initialize_database(&conn).expect("Failed to initialize DB");

        let now = "2025-01-01T00:00:00+00:00";
        conn.execute(
            "INSERT INTO private_chats (user1, user2, created_date) VALUES (?1, ?2, ?3)",
            rusqlite::params!["alice", "bob", now],
        )
        .expect("First insert failed");

        let dup = conn.execute(
            "INSERT INTO private_chats (user1, user2, created_date) VALUES (?1, ?2, ?3)",
            rusqlite::params!["alice", "bob", now],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_wal_mode_enabled() {
        let conn = Connection::open_in_memory().expect("Failed to open in-memory DB");
        initialize_database(&conn).expect("Failed to initialize DB");

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .expect("Query failed");

        // In-memory databases don't support WAL, but query should not fail
        assert!(!journal_mode.is_empty());
    }
}
