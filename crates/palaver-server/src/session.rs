//! Chat sessions.
//!
//! A connected user is split in two:
//!
//! - [`SessionHandle`] is the shared part, referenced by the [`PresenceHub`].
//!   Other sessions use it to deliver messages and to read which
//!   conversation this user has open.
//! - [`ChatSession`] is the connection-local part. It is driven only by its
//!   own router loop, so its state needs no locking beyond the open-peer
//!   slot it publishes through the handle.

use std::collections::HashMap;
use std::sync::Arc;

use palaver_core::time;
use palaver_core::{
    ChatError, ChatPreview, ConnectionId, EventKind, InboundEvent, Message, MessageId,
    OutboundMessage, UserId,
};
use palaver_store::{ChatStore, StoreError};
use parking_lot::RwLock;
use tracing::{debug, error};

use crate::hub::PresenceHub;
use crate::router::{EventRouter, HandlerFuture, Outbox};

/// The shared, hub-visible side of one connected user.
pub struct SessionHandle {
    user_id: UserId,
    connection_id: ConnectionId,
    outbox: Outbox,
    open_peer: RwLock<Option<UserId>>,
}

impl SessionHandle {
    /// Create a handle for a fresh connection.
    pub fn new(user_id: UserId, outbox: Outbox) -> Self {
        Self {
            user_id,
            connection_id: ConnectionId::new(),
            outbox,
            open_peer: RwLock::new(None),
        }
    }

    /// The owning user.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// This connection's id.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// The peer whose conversation is currently open, if any.
    pub fn open_peer(&self) -> Option<UserId> {
        *self.open_peer.read()
    }

    pub(crate) fn set_open_peer(&self, peer: Option<UserId>) {
        *self.open_peer.write() = peer;
    }

    /// Queue a message for this user's connection.
    pub fn send(&self, message: &OutboundMessage) -> bool {
        self.outbox.send(message)
    }

    /// Ask the connection to close. Queued frames are still flushed.
    pub fn close(&self) {
        self.outbox.close();
    }

    /// Whether the connection has been asked to close.
    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }
}

/// Business logic for one connected user.
pub struct ChatSession {
    handle: Arc<SessionHandle>,
    store: Arc<dyn ChatStore>,
    hub: Arc<PresenceHub>,
    previews: HashMap<UserId, ChatPreview>,
}

impl ChatSession {
    /// Build a session, loading the user's conversation previews.
    ///
    /// A failed preview fetch fails the whole connection.
    pub async fn connect(
        handle: Arc<SessionHandle>,
        store: Arc<dyn ChatStore>,
        hub: Arc<PresenceHub>,
    ) -> Result<Self, StoreError> {
        let previews = store.list_previews(handle.user_id()).await?;
        debug!(user_id = %handle.user_id(), chats = previews.len(), "previews loaded");
        Ok(Self {
            previews: previews.into_iter().map(|p| (p.peer_id, p)).collect(),
            handle,
            store,
            hub,
        })
    }

    /// Bind this session's handlers on `router`.
    pub fn bind(router: &mut EventRouter<Self>) {
        router.register_handler(EventKind::Message, on_message);
        router.register_handler(EventKind::Join, on_join);
        router.register_handler(EventKind::Leave, on_leave);
    }

    /// The owning user.
    pub fn user_id(&self) -> &UserId {
        self.handle.user_id()
    }

    /// The shared handle registered with the hub.
    pub fn handle(&self) -> &Arc<SessionHandle> {
        &self.handle
    }

    /// The peer whose conversation is open, if any.
    pub fn open_peer(&self) -> Option<UserId> {
        self.handle.open_peer()
    }

    /// Cached previews, most recent conversation first.
    pub fn previews(&self) -> Vec<ChatPreview> {
        let mut previews: Vec<_> = self.previews.values().cloned().collect();
        previews.sort_by(|a, b| b.last_sent_at.cmp(&a.last_sent_at));
        previews
    }

    /// Send the cached previews to the client.
    pub fn hydrate(&self) -> bool {
        self.send(&OutboundMessage::Chats {
            chats: self.previews(),
        })
    }

    /// Queue a message on this user's own connection.
    pub fn send(&self, message: &OutboundMessage) -> bool {
        self.handle.send(message)
    }

    /// Persist and deliver a chat message to the open peer.
    pub async fn handle_message(&mut self, event: InboundEvent) -> Result<(), ChatError> {
        let Some(peer) = self.open_peer() else {
            return Err(ChatError::NotInConversation);
        };

        let me = *self.user_id();
        let now = time::now();
        if let Some(client_sent_at) = event.sent_at {
            debug!(skew_ms = (now - client_sent_at).num_milliseconds(), "client clock skew");
        }

        let message = Message {
            id: MessageId::new(),
            sender_id: me,
            receiver_id: peer,
            content: event.content,
            sent_at: now,
            read_at: self.hub.is_in_chat_with(&peer, &me).then_some(now),
        };

        if let Err(err) = self.store.append_message(&message).await {
            error!(
                user_id = %me,
                peer_id = %peer,
                op = "append_message",
                error = %err,
                "error while sending message"
            );
            return Err(ChatError::Internal("error while sending message".into()));
        }

        if self.hub.is_online(&me) {
            let _ = self.send(&message.to_outbound(&me, event.tag.clone()));
        }
        if let Some(peer_session) = self.hub.get(&peer) {
            let _ = peer_session.send(&message.to_outbound(&peer, event.tag));
        }

        self.remember(&message);
        Ok(())
    }

    /// Open the conversation with the peer id in `event.content`.
    pub async fn handle_join(&mut self, event: InboundEvent) -> Result<(), ChatError> {
        let peer: UserId = event
            .content
            .parse()
            .map_err(|_| ChatError::BadRequest("invalid receiver id".into()))?;
        let me = *self.user_id();
        if peer == me {
            return Err(ChatError::BadRequest(
                "could not open a chat with yourself".into(),
            ));
        }

        self.handle.set_open_peer(Some(peer));
        let now = time::now();

        match self.store.mark_read(&peer, &me, now).await {
            Ok(marked) => debug!(peer_id = %peer, marked, "conversation opened"),
            Err(err) => {
                error!(
                    user_id = %me,
                    peer_id = %peer,
                    op = "mark_read",
                    error = %err,
                    "error while opening chat"
                );
                return Err(ChatError::Internal("error while opening chat".into()));
            }
        }

        if let Some(preview) = self.previews.get_mut(&peer) {
            preview.unread = 0;
        }

        if self.hub.is_in_chat_with(&peer, &me) {
            if let Some(peer_session) = self.hub.get(&peer) {
                let _ = peer_session.send(&OutboundMessage::Read {
                    chat_key: me,
                    read_at: now,
                });
            }
        }
        Ok(())
    }

    /// Close the open conversation.
    pub fn handle_leave(&mut self) {
        self.handle.set_open_peer(None);
    }

    fn remember(&mut self, message: &Message) {
        let preview = self
            .previews
            .entry(message.receiver_id)
            .or_insert_with(|| ChatPreview {
                peer_id: message.receiver_id,
                unread: 0,
                last_message: String::new(),
                last_sent_at: message.sent_at,
                last_from_viewer: true,
            });
        preview.last_message.clone_from(&message.content);
        preview.last_sent_at = message.sent_at;
        preview.last_from_viewer = true;
    }
}

fn on_message(session: &mut ChatSession, event: InboundEvent) -> HandlerFuture<'_> {
    Box::pin(session.handle_message(event))
}

fn on_join(session: &mut ChatSession, event: InboundEvent) -> HandlerFuture<'_> {
    Box::pin(session.handle_join(event))
}

fn on_leave(session: &mut ChatSession, _event: InboundEvent) -> HandlerFuture<'_> {
    session.handle_leave();
    Box::pin(std::future::ready(Ok(())))
}

// ─────────────────────────────────────────────────────────────────────────────
// Test support
// ─────────────────────────────────────────────────────────────────────────────


// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
