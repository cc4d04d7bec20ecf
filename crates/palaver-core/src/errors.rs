//! Chat error taxonomy.
//!
//! Every variant is recoverable from the connection's point of view: the
//! router turns it into an error frame and keeps reading. Fatal conditions
//! (failed initial preview fetch, transport closure) are not represented here.

use thiserror::Error;

use crate::events::{ErrorCode, OutboundMessage};

/// Errors raised while handling a client event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Malformed payload or a request that can never succeed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A message arrived with no conversation open.
    #[error("no conversation is open")]
    NotInConversation,

    /// The frame was not valid JSON of the expected shape.
    #[error("could not decode frame: {0}")]
    Decode(String),

    /// The frame named an event kind with no handler.
    #[error("unknown event kind: {0}")]
    UnknownEvent(String),

    /// A server-side failure. The payload is the opaque text shown to the client.
    #[error("{0}")]
    Internal(String),
}

impl ChatError {
    /// Wire code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BadRequest(_) => ErrorCode::BadRequest,
            Self::NotInConversation => ErrorCode::NotInConversation,
            Self::Decode(_) => ErrorCode::ParseError,
            Self::UnknownEvent(_) => ErrorCode::UnknownEvent,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Text safe to show the client. Decode details stay server-side.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Decode(_) => "could not decode frame".to_string(),
            other => other.to_string(),
        }
    }

    /// Error frame for this error.
    #[must_use]
    pub fn to_outbound(&self) -> OutboundMessage {
        OutboundMessage::error(self.code(), self.client_message())
    }
}

/// Convenience type alias for chat results.
pub type Result<T> = std::result::Result<T, ChatError>;
