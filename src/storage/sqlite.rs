//! SQLite mirror of the record stream
//!
//! The mirror is secondary: every failure is logged and swallowed so the
//! primary JSONL log is never affected.

use crate::records::ThreadRecord;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::RecordSink;
use crate::DarkwatchError;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;

/// SQLite mirror backend
pub struct SqliteMirror {
    conn: Connection,
}

impl SqliteMirror {
    /// Opens or creates the mirror database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteMirror)` - Successfully opened/created database
    /// * `Err(DarkwatchError)` - Failed to open database
    pub fn open(path: &Path) -> Result<Self, DarkwatchError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, DarkwatchError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Writes every post of a thread (and its attachments) in one transaction
    ///
    /// # Returns
    ///
    /// Number of post rows written
    pub fn insert_thread(&mut self, record: &ThreadRecord) -> Result<usize, DarkwatchError> {
        let fetched_at = record.fetched_at.to_rfc3339();
        let tx = self.conn.transaction()?;

        for post in &record.posts {
            tx.execute(
                "INSERT INTO posts (source, thread_url, post_url, title, author, posted_at, content, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.source,
                    record.thread_url,
                    post.post_url,
                    record.title,
                    post.author,
                    post.posted_at,
                    post.content,
                    fetched_at
                ],
            )?;
            let post_id = tx.last_insert_rowid();

            for attachment in &post.attachments {
                tx.execute(
                    "INSERT INTO attachments (post_id, display_filename, display_size, attachment_url)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        post_id,
                        attachment.display_filename,
                        attachment.display_size,
                        attachment.attachment_url
                    ],
                )?;
            }
        }

        tx.commit()?;
        Ok(record.posts.len())
    }

    pub fn count_posts(&self) -> Result<u64, DarkwatchError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn count_attachments(&self) -> Result<u64, DarkwatchError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM attachments", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[async_trait]
impl RecordSink for SqliteMirror {
    async fn accept(&mut self, record: &ThreadRecord) -> Result<(), DarkwatchError> {
        if let Err(e) = self.insert_thread(record) {
            tracing::warn!("SQLite mirror write failed for {}: {}", record.thread_url, e);
        }
        Ok(())
    }
}
