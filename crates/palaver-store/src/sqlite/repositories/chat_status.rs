//! Read watermark repository.
//!
//! A `chat_status` row records when `user_id` last opened the conversation
//! with `peer_id`. Preview unread counts only consider messages at or after
//! this watermark.

use chrono::{DateTime, Utc};
use palaver_core::UserId;
use palaver_core::time;
use rusqlite::{Connection, params};

use crate::errors::Result;

/// Read watermark repository.
pub struct ChatStatusRepo;

impl ChatStatusRepo {
    /// Advance the watermark for `user` viewing `peer`. Never moves it backwards.
    pub fn touch(conn: &Connection, user: &UserId, peer: &UserId, at: &DateTime<Utc>) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO chat_status (user_id, peer_id, last_active_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id, peer_id)
             DO UPDATE SET last_active_at = MAX(last_active_at, excluded.last_active_at)",
            params![user.to_string(), peer.to_string(), time::to_db(at)],
        )?;
        Ok(())
    }
}
