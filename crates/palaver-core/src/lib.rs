//! # palaver-core
//!
//! Shared vocabulary for the Palaver chat core.
//!
//! - **IDs**: `UserId` (account UUID), `MessageId` and `ConnectionId` (UUID v7 newtypes)
//! - **Models**: persisted `Message` records and derived `ChatPreview` summaries
//! - **Events**: inbound `InboundEvent` decoding and the tagged `OutboundMessage` wire enum
//! - **Errors**: `ChatError` taxonomy with stable wire codes
//! - **Logging**: `tracing-subscriber` initialization

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod time;

pub use errors::{ChatError, Result};
pub use events::{ErrorCode, EventKind, InboundEvent, OutboundMessage};
pub use ids::{ConnectionId, MessageId, UserId};
pub use messages::{ChatPreview, Message};
