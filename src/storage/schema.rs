//! Database schema definitions for the relational mirror
//!
//! Thread-level fields are denormalized onto every post row so the mirror can
//! be queried without reading the JSONL log.

/// SQL schema for the mirror database
pub const SCHEMA_SQL: &str = r#"
-- One row per post, thread fields denormalized
CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    thread_url TEXT NOT NULL,
    post_url TEXT NOT NULL,
    title TEXT,
    author TEXT,
    posted_at TEXT,
    content TEXT NOT NULL,
    fetched_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_posts_source ON posts(source);
CREATE INDEX IF NOT EXISTS idx_posts_thread ON posts(thread_url);

-- Attachment metadata, never the file itself
CREATE TABLE IF NOT EXISTS attachments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    display_filename TEXT,
    display_size TEXT,
    attachment_url TEXT
);

CREATE INDEX IF NOT EXISTS idx_attachments_post ON attachments(post_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_creation() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(initialize_schema(&conn).is_ok());

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"posts".to_string()));
        assert!(tables.contains(&"attachments".to_string()));
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(initialize_schema(&conn).is_ok());
        assert!(initialize_schema(&conn).is_ok());
    }
}
