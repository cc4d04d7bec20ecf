//! Chat preview queries.
//!
//! One preview per counterpart: the latest message in either direction plus
//! the count of unread messages from that counterpart since the viewer's
//! watermark. Ordered most recent conversation first.

use palaver_core::{ChatPreview, UserId};
use rusqlite::{Connection, params};

use crate::errors::Result;
use crate::sqlite::row_types::{parse_time, parse_user};

/// Preview repository.
pub struct PreviewRepo;

const PREVIEWS_SQL: &str = "
WITH convo AS (
    SELECT CASE WHEN sender_id = ?1 THEN receiver_id ELSE sender_id END AS peer_id,
           sender_id, content, sent_at, id
    FROM messages
    WHERE sender_id = ?1 OR receiver_id = ?1
),
latest AS (
    SELECT c.peer_id, c.sender_id, c.content, c.sent_at
    FROM convo c
    WHERE c.id = (
        SELECT c2.id FROM convo c2
        WHERE c2.peer_id = c.peer_id
        ORDER BY c2.sent_at DESC, c2.id DESC
        LIMIT 1
    )
)
SELECT l.peer_id,
       l.content,
       l.sent_at,
       l.sender_id = ?1 AS from_viewer,
       (SELECT COUNT(*) FROM messages m
        WHERE m.sender_id = l.peer_id
          AND m.receiver_id = ?1
          AND m.read_at IS NULL
          AND m.sent_at >= COALESCE(
                (SELECT s.last_active_at FROM chat_status s
                 WHERE s.user_id = ?1 AND s.peer_id = l.peer_id), '')
       ) AS unread
FROM latest l
ORDER BY l.sent_at DESC";

impl PreviewRepo {
    /// Previews for every conversation `viewer` takes part in.
    pub fn list(conn: &Connection, viewer: &UserId) -> Result<Vec<ChatPreview>> {
        let mut stmt = conn.prepare(PREVIEWS_SQL)?;
        let rows = stmt
            .query_map(params![viewer.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, u32>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(peer, content, sent_at, from_viewer, unread)| {
                Ok(ChatPreview {
                    peer_id: parse_user(&peer, "messages")?,
                    unread,
                    last_message: content,
                    last_sent_at: parse_time(&sent_at, "messages")?,
                    last_from_viewer: from_viewer,
                })
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
