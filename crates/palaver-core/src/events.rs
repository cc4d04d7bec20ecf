//! Wire events exchanged with chat clients.
//!
//! Inbound frames are JSON objects `{kind, content, tag?, sentAt?}`. Decoding
//! happens in two steps: serde reads the raw shape, then the `kind` string is
//! resolved to an [`EventKind`]. Keeping the kind as text during the first
//! step lets a frame with an unrecognised kind be reported distinctly from a
//! frame that is not valid JSON at all.
//!
//! Outbound frames are the [`OutboundMessage`] enum, internally tagged by
//! `kind`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ChatError;
use crate::ids::UserId;
use crate::messages::ChatPreview;

/// Kinds of inbound events a client may send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A chat message for the open conversation.
    Message,
    /// Open a conversation with the peer id in `content`.
    Join,
    /// Close the open conversation.
    Leave,
}

impl EventKind {
    /// Canonical wire spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "MESSAGE",
            Self::Join => "JOIN",
            Self::Leave => "LEAVE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MESSAGE" => Ok(Self::Message),
            "JOIN" => Ok(Self::Join),
            "LEAVE" => Ok(Self::Leave),
            _ => Err(ChatError::UnknownEvent(s.to_string())),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInbound {
    kind: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    sent_at: Option<DateTime<Utc>>,
}

/// A decoded inbound event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundEvent {
    /// What the client asked for.
    pub kind: EventKind,
    /// Message body for `MESSAGE`, peer id for `JOIN`, ignored for `LEAVE`.
    pub content: String,
    /// Client correlation tag, echoed back on the resulting message.
    pub tag: Option<String>,
    /// Client-side send time. Informational only.
    pub sent_at: Option<DateTime<Utc>>,
}

impl InboundEvent {
    /// Construct an event directly. Mostly useful in tests.
    #[must_use]
    pub fn new(kind: EventKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            tag: None,
            sent_at: None,
        }
    }

    /// Attach a correlation tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Decode a text or binary frame payload.
    ///
    /// Returns [`ChatError::Decode`] for payloads that are not the expected
    /// JSON shape and [`ChatError::UnknownEvent`] for an unrecognised kind.
    pub fn decode(raw: &[u8]) -> Result<Self, ChatError> {
        let raw: RawInbound =
            serde_json::from_slice(raw).map_err(|e| ChatError::Decode(e.to_string()))?;
        Ok(Self {
            kind: raw.kind.parse()?,
            content: raw.content,
            tag: raw.tag,
            sent_at: raw.sent_at,
        })
    }
}

/// Stable error codes carried by outbound error frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed payload or a request that can never succeed.
    BadRequest,
    /// `MESSAGE` sent with no conversation open.
    NotInConversation,
    /// Frame could not be decoded.
    ParseError,
    /// Frame named an event kind with no handler.
    UnknownEvent,
    /// Server-side failure. Details are logged, never sent.
    InternalError,
    /// A newer connection for the same user took over.
    SessionReplaced,
}

/// Everything the server can push to a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutboundMessage {
    /// A chat message, either the sender's echo or the peer's delivery.
    #[serde(rename_all = "camelCase")]
    Message {
        /// Id of the other party relative to the recipient of this frame.
        chat_key: UserId,
        /// Message body.
        content: String,
        /// Correlation tag supplied by the sender.
        #[serde(default)]
        tag: Option<String>,
        /// Whether the recipient of this frame wrote the message.
        author: bool,
        /// Server receipt time.
        sent_at: DateTime<Utc>,
        /// Read time, present when the message was read on arrival.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        read_at: Option<DateTime<Utc>>,
    },
    /// The peer keyed by `chat_key` has read everything sent to them up to `read_at`.
    #[serde(rename_all = "camelCase")]
    Read {
        /// Id of the peer who read the messages.
        chat_key: UserId,
        /// When they were read.
        read_at: DateTime<Utc>,
    },
    /// A recoverable error.
    Error {
        /// Machine-readable code.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
    },
    /// Conversation previews, sent once after connecting.
    Chats {
        /// Most recent conversation first.
        chats: Vec<ChatPreview>,
    },
}

impl OutboundMessage {
    /// Build an error frame.
    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn decode_message_with_all_fields() {
        let raw = br#"{"kind":"MESSAGE","content":"hi","tag":"t-1","sentAt":"2024-05-01T12:00:00Z"}"#;
        let event = InboundEvent::decode(raw).unwrap();
        assert_eq!(event.kind, EventKind::Message);
        assert_eq!(event.content, "hi");
        assert_eq!(event.tag.as_deref(), Some("t-1"));
        assert!(event.sent_at.is_some());
    }

    #[test]
    fn decode_accepts_lowercase_kind() {
        let event = InboundEvent::decode(br#"{"kind":"join","content":"x"}"#).unwrap();
        assert_eq!(event.kind, EventKind::Join);
    }

    #[test]
    fn decode_leave_without_content() {
        let event = InboundEvent::decode(br#"{"kind":"LEAVE"}"#).unwrap();
        assert_eq!(event.kind, EventKind::Leave);
        assert!(event.content.is_empty());
    }

    #[test]
    fn decode_rejects_non_json() {
        assert_matches!(InboundEvent::decode(b"hello"), Err(ChatError::Decode(_)));
    }

    #[test]
    fn decode_rejects_missing_kind() {
        assert_matches!(
            InboundEvent::decode(br#"{"content":"hi"}"#),
            Err(ChatError::Decode(_))
        );
    }

    #[test]
    fn decode_reports_unknown_kind() {
        assert_matches!(
            InboundEvent::decode(br#"{"kind":"TYPING"}"#),
            Err(ChatError::UnknownEvent(kind)) if kind == "TYPING"
        );
    }

    #[test]
    fn message_frame_shape() {
        let key = UserId::random();
        let sent_at = time::now();
        let frame = OutboundMessage::Message {
            chat_key: key,
            content: "hi".into(),
            tag: Some("t".into()),
            author: true,
            sent_at,
            read_at: None,
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["kind"], "message");
        assert_eq!(value["chatKey"], key.to_string());
        assert_eq!(value["author"], true);
        assert_eq!(value["tag"], "t");
        assert!(value.get("readAt").is_none());
    }

    #[test]
    fn message_frame_includes_read_at_when_set() {
        let now = time::now();
        let frame = OutboundMessage::Message {
            chat_key: UserId::random(),
            content: "hi".into(),
            tag: None,
            author: false,
            sent_at: now,
            read_at: Some(now),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert!(value.get("readAt").is_some());
    }

    #[test]
    fn read_and_error_frame_shapes() {
        let key = UserId::random();
        let read = serde_json::to_value(OutboundMessage::Read {
            chat_key: key,
            read_at: time::now(),
        })
        .unwrap();
        assert_eq!(read["kind"], "read");
        assert_eq!(read["chatKey"], key.to_string());
        assert!(read.get("readAt").is_some());

        let err = serde_json::to_value(OutboundMessage::error(
            ErrorCode::NotInConversation,
            "no conversation is open",
        ))
        .unwrap();
        assert_eq!(
            err,
            json!({"kind": "error", "code": "NOT_IN_CONVERSATION", "message": "no conversation is open"})
        );
    }
}
