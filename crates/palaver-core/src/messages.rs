//! Chat domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::OutboundMessage;
use crate::ids::{MessageId, UserId};

/// A persisted one-to-one chat message.
///
/// `sender_id` and `receiver_id` always differ. `read_at`, once set, is never
/// earlier than `sent_at`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Unique message id.
    pub id: MessageId,
    /// Author of the message.
    pub sender_id: UserId,
    /// Recipient of the message.
    pub receiver_id: UserId,
    /// Free-text body.
    pub content: String,
    /// Server receipt time.
    pub sent_at: DateTime<Utc>,
    /// When the recipient first viewed the conversation after `sent_at`.
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    /// The party on the other side of this message from `viewer`'s point of view.
    #[must_use]
    pub fn counterpart(&self, viewer: &UserId) -> UserId {
        if self.sender_id == *viewer {
            self.receiver_id
        } else {
            self.sender_id
        }
    }

    /// Build the outbound frame `viewer` should receive for this message.
    ///
    /// The chat key is the counterpart's id so each client files the message
    /// under the right conversation. `author` is set when `viewer` sent it.
    #[must_use]
    pub fn to_outbound(&self, viewer: &UserId, tag: Option<String>) -> OutboundMessage {
        OutboundMessage::Message {
            chat_key: self.counterpart(viewer),
            content: self.content.clone(),
            tag,
            author: self.sender_id == *viewer,
            sent_at: self.sent_at,
            read_at: self.read_at,
        }
    }
}

/// Per-viewer summary of one conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPreview {
    /// The other participant.
    pub peer_id: UserId,
    /// Messages from the peer that the viewer has not read since last opening the chat.
    pub unread: u32,
    /// Body of the most recent message in either direction.
    pub last_message: String,
    /// Timestamp of the most recent message.
    pub last_sent_at: DateTime<Utc>,
    /// Whether the viewer wrote the most recent message.
    pub last_from_viewer: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time;
    use assert_matches::assert_matches;

    fn message(sender: UserId, receiver: UserId) -> Message {
        Message {
            id: MessageId::new(),
            sender_id: sender,
            receiver_id: receiver,
            content: "hi".into(),
            sent_at: time::now(),
            read_at: None,
        }
    }

    #[test]
    fn counterpart_is_symmetric() {
        let (a, b) = (UserId::random(), UserId::random());
        let msg = message(a, b);
        assert_eq!(msg.counterpart(&a), b);
        assert_eq!(msg.counterpart(&b), a);
    }

    #[test]
    fn sender_copy_keys_on_receiver() {
        let (a, b) = (UserId::random(), UserId::random());
        let msg = message(a, b);
        assert_matches!(
            msg.to_outbound(&a, Some("t1".into())),
            OutboundMessage::Message { chat_key, author: true, tag: Some(tag), .. } if chat_key == b && tag == "t1"
        );
    }

    #[test]
    fn receiver_copy_keys_on_sender() {
        let (a, b) = (UserId::random(), UserId::random());
        let msg = message(a, b);
        assert_matches!(
            msg.to_outbound(&b, None),
            OutboundMessage::Message { chat_key, author: false, .. } if chat_key == a
        );
    }

    #[test]
    fn preview_serializes_camel_case() {
        let preview = ChatPreview {
            peer_id: UserId::random(),
            unread: 3,
            last_message: "yo".into(),
            last_sent_at: time::now(),
            last_from_viewer: false,
        };
        let json = serde_json::to_value(&preview).unwrap();
        assert_eq!(json["unread"], 3);
        assert_eq!(json["lastMessage"], "yo");
        assert!(json.get("peerId").is_some());
        assert_eq!(json["lastFromViewer"], false);
    }
}
