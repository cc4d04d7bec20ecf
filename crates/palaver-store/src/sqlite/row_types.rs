//! Row mapping between `SQLite` text columns and domain types.

use chrono::{DateTime, Utc};
use palaver_core::time;
use palaver_core::{Message, MessageId, UserId};
use rusqlite::Row;

use crate::errors::{Result, StoreError};

/// Column list matching [`MessageRow::from_row`].
pub const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, sent_at, read_at";

/// Raw `messages` row as stored.
#[derive(Debug)]
pub struct MessageRow {
    /// Message id.
    pub id: String,
    /// Sender UUID text.
    pub sender_id: String,
    /// Receiver UUID text.
    pub receiver_id: String,
    /// Body.
    pub content: String,
    /// RFC 3339 send time.
    pub sent_at: String,
    /// RFC 3339 read time.
    pub read_at: Option<String>,
}

impl MessageRow {
    /// Read a row selected with [`MESSAGE_COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sender_id: row.get(1)?,
            receiver_id: row.get(2)?,
            content: row.get(3)?,
            sent_at: row.get(4)?,
            read_at: row.get(5)?,
        })
    }

    /// Convert into the domain model.
    pub fn into_message(self) -> Result<Message> {
        Ok(Message {
            sender_id: parse_user(&self.sender_id, "messages")?,
            receiver_id: parse_user(&self.receiver_id, "messages")?,
            sent_at: parse_time(&self.sent_at, "messages")?,
            read_at: self
                .read_at
                .as_deref()
                .map(|raw| parse_time(raw, "messages"))
                .transpose()?,
            id: MessageId::from_string(self.id),
            content: self.content,
        })
    }
}

/// Parse a stored user id.
pub fn parse_user(raw: &str, table: &'static str) -> Result<UserId> {
    raw.parse().map_err(|e| StoreError::CorruptRow {
        table,
        message: format!("user id {raw:?}: {e}"),
    })
}

/// Parse a stored timestamp.
pub fn parse_time(raw: &str, table: &'static str) -> Result<DateTime<Utc>> {
    time::from_db(raw).map_err(|e| StoreError::CorruptRow {
        table,
        message: format!("timestamp {raw:?}: {e}"),
    })
}
