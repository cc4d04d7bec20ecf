//! The persistence boundary consumed by chat sessions.
//!
//! [`ChatStore`] is async so sessions can await it on their connection task.
//! [`SqliteChatStore`] satisfies it by running each repository call on the
//! blocking pool against a pooled connection.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use palaver_core::{ChatPreview, Message, UserId};
use rusqlite::Connection;
use tracing::{debug, instrument};

use crate::errors::{Result, StoreError};
use crate::sqlite::connection::{self, ConnectionConfig, ConnectionPool};
use crate::sqlite::migrations;
use crate::sqlite::repositories::{ChatStatusRepo, MessageRepo, PreviewRepo};

/// Upper bound on a single history page.
pub const MAX_HISTORY_LIMIT: u32 = 50;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Normalize caller-supplied pagination.
///
/// Negative or absent offsets become 0. Absent, zero, or negative limits
/// become [`DEFAULT_HISTORY_LIMIT`]. Limits above [`MAX_HISTORY_LIMIT`] are
/// clamped.
pub fn clamp_page(offset: Option<i64>, limit: Option<i64>) -> (u32, u32) {
    let offset = offset
        .filter(|o| *o > 0)
        .map_or(0, |o| u32::try_from(o).unwrap_or(u32::MAX));
    let limit = match limit {
        Some(l) if l > 0 => u32::try_from(l).unwrap_or(u32::MAX).min(MAX_HISTORY_LIMIT),
        _ => DEFAULT_HISTORY_LIMIT,
    };
    (offset, limit)
}

/// Message persistence used by the chat core.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Persist a new message.
    async fn append_message(&self, message: &Message) -> Result<()>;

    /// Mark every unread message from `from` to `to` sent at or before `at`
    /// as read at `at`, and advance `to`'s watermark for the pair.
    async fn mark_read(&self, from: &UserId, to: &UserId, at: DateTime<Utc>) -> Result<usize>;

    /// Conversation previews for `user`, most recent first.
    async fn list_previews(&self, user: &UserId) -> Result<Vec<ChatPreview>>;

    /// Messages between `a` and `b`, newest first. A `limit` of 0 means
    /// [`DEFAULT_HISTORY_LIMIT`]; larger limits are clamped to
    /// [`MAX_HISTORY_LIMIT`].
    async fn list_history(
        &self,
        a: &UserId,
        b: &UserId,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Message>>;
}

/// `SQLite`-backed [`ChatStore`].
#[derive(Clone)]
pub struct SqliteChatStore {
    pool: Arc<ConnectionPool>,
}

impl SqliteChatStore {
    /// Open (or create) a database file and run pending migrations.
    pub fn open(path: &str, config: &ConnectionConfig) -> Result<Self> {
        Self::from_pool(connection::new_file(path, config)?)
    }

    /// In-memory store with a single shared connection.
    pub fn in_memory() -> Result<Self> {
        Self::from_pool(connection::new_in_memory(&ConnectionConfig::default())?)
    }

    fn from_pool(pool: ConnectionPool) -> Result<Self> {
        let conn = pool.get()?;
        let applied = migrations::run_migrations(&conn)?;
        debug!(applied, "message store ready");
        drop(conn);
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("blocking task failed: {e}")))?
    }
}

#[async_trait]
impl ChatStore for SqliteChatStore {
    #[instrument(skip_all, fields(message_id = %message.id))]
    async fn append_message(&self, message: &Message) -> Result<()> {
        let message = message.clone();
        self.with_conn(move |conn| MessageRepo::insert(conn, &message))
            .await
    }

    #[instrument(skip(self))]
    async fn mark_read(&self, from: &UserId, to: &UserId, at: DateTime<Utc>) -> Result<usize> {
        let (from, to) = (*from, *to);
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let marked = MessageRepo::mark_read(&tx, &from, &to, &at)?;
            ChatStatusRepo::touch(&tx, &to, &from, &at)?;
            tx.commit()?;
            Ok(marked)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_previews(&self, user: &UserId) -> Result<Vec<ChatPreview>> {
        let user = *user;
        self.with_conn(move |conn| PreviewRepo::list(conn, &user))
            .await
    }

    #[instrument(skip(self))]
    async fn list_history(
        &self,
        a: &UserId,
        b: &UserId,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let (a, b) = (*a, *b);
        let limit = match limit {
            0 => DEFAULT_HISTORY_LIMIT,
            l => l.min(MAX_HISTORY_LIMIT),
        };
        self.with_conn(move |conn| MessageRepo::history(conn, &a, &b, offset, limit))
            .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
