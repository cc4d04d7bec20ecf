//! Process-wide presence registry.
//!
//! The hub maps each online user to the handle of their single live
//! session. Registering a second connection for the same user evicts the
//! first: the old connection is told why and then closed.

use std::sync::Arc;

use dashmap::DashMap;
use metrics::counter;
use palaver_core::{ConnectionId, ErrorCode, OutboundMessage, UserId};
use tracing::{debug, info};

use crate::metrics::WS_SESSIONS_REPLACED_TOTAL;
use crate::session::SessionHandle;

/// Who is online and what they are looking at.
#[derive(Default)]
pub struct PresenceHub {
    sessions: DashMap<UserId, Arc<SessionHandle>>,
}

impl PresenceHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session` under its own user id.
    ///
    /// A session already registered for that user on a different connection
    /// is removed, sent a `SESSION_REPLACED` error, and closed. The swap is a
    /// single atomic insert, so lookups never see two sessions for one user
    /// or a gap between them.
    pub fn register(&self, session: Arc<SessionHandle>) {
        let user_id = *session.user_id();
        let connection_id = session.connection_id().clone();
        let Some(previous) = self.sessions.insert(user_id, session) else {
            debug!(%user_id, %connection_id, "session registered");
            return;
        };
        if previous.connection_id() == &connection_id {
            return;
        }
        info!(
            %user_id,
            evicted = %previous.connection_id(),
            %connection_id,
            "replacing existing session"
        );
        counter!(WS_SESSIONS_REPLACED_TOTAL).increment(1);
        let _ = previous.send(&OutboundMessage::error(
            ErrorCode::SessionReplaced,
            "signed in from another connection",
        ));
        previous.close();
    }

    /// Remove whatever session is registered for `user_id`. No-op if none.
    pub fn unregister(&self, user_id: &UserId) {
        if self.sessions.remove(user_id).is_some() {
            debug!(%user_id, "session unregistered");
        }
    }

    /// Remove the entry for `user_id` only if it belongs to `connection_id`.
    ///
    /// Connection teardown uses this so an evicted connection cannot remove
    /// the session that replaced it. Returns whether an entry was removed.
    pub fn unregister_connection(&self, user_id: &UserId, connection_id: &ConnectionId) -> bool {
        let removed = self
            .sessions
            .remove_if(user_id, |_, session| session.connection_id() == connection_id)
            .is_some();
        if removed {
            debug!(%user_id, %connection_id, "session unregistered");
        }
        removed
    }

    /// Whether `user_id` has a live session.
    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.sessions.contains_key(user_id)
    }

    /// Whether `user_id` is online with a conversation open with `with`.
    pub fn is_in_chat_with(&self, user_id: &UserId, with: &UserId) -> bool {
        self.sessions
            .get(user_id)
            .is_some_and(|session| session.open_peer().as_ref() == Some(with))
    }

    /// The live session for `user_id`, if any.
    pub fn get(&self, user_id: &UserId) -> Option<Arc<SessionHandle>> {
        self.sessions.get(user_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of users online.
    pub fn online_count(&self) -> usize {
        self.sessions.len()
    }

    /// Close every registered session. Used during shutdown.
    pub fn close_all(&self) {
        for entry in &self.sessions {
            entry.value().close();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
