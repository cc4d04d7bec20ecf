//! Message repository: append, read marking, and paginated history.

use chrono::{DateTime, Utc};
use palaver_core::time;
use palaver_core::{Message, UserId};
use rusqlite::{Connection, params};

use crate::errors::{Result, StoreError};
use crate::sqlite::row_types::{MESSAGE_COLUMNS, MessageRow};

/// Message repository.
pub struct MessageRepo;

impl MessageRepo {
    /// Insert a new message.
    pub fn insert(conn: &Connection, message: &Message) -> Result<()> {
        if message.sender_id == message.receiver_id {
            return Err(StoreError::InvalidMessage(
                "sender and receiver must differ".into(),
            ));
        }
        if message.read_at.is_some_and(|read_at| read_at < message.sent_at) {
            return Err(StoreError::InvalidMessage(
                "read_at precedes sent_at".into(),
            ));
        }
        let _ = conn.execute(
            "INSERT INTO messages (id, sender_id, receiver_id, content, sent_at, read_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id.as_str(),
                message.sender_id.to_string(),
                message.receiver_id.to_string(),
                message.content,
                time::to_db(&message.sent_at),
                message.read_at.as_ref().map(time::to_db),
            ],
        )?;
        Ok(())
    }

    /// Set `read_at` on unread messages from `from` to `to` sent at or before `at`.
    ///
    /// Returns the number of messages marked.
    pub fn mark_read(
        conn: &Connection,
        from: &UserId,
        to: &UserId,
        at: &DateTime<Utc>,
    ) -> Result<usize> {
        let at = time::to_db(at);
        let changed = conn.execute(
            "UPDATE messages SET read_at = ?3
             WHERE sender_id = ?1 AND receiver_id = ?2
               AND read_at IS NULL AND sent_at <= ?3",
            params![from.to_string(), to.to_string(), at],
        )?;
        Ok(changed)
    }

    /// Messages between `a` and `b` in either direction, newest first.
    pub fn history(
        conn: &Connection,
        a: &UserId,
        b: &UserId,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY sent_at DESC, id DESC
             LIMIT ?3 OFFSET ?4"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![a.to_string(), b.to_string(), limit, offset],
                MessageRow::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(MessageRow::into_message).collect()
    }

}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
