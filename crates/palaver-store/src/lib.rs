//! # palaver-store
//!
//! Message persistence for the Palaver chat core.
//!
//! - **`ChatStore`**: the async persistence boundary consumed by chat sessions
//! - **`SqliteChatStore`**: `r2d2` pooled `rusqlite` implementation, blocking work on `spawn_blocking`
//! - **Repositories**: stateless query modules for messages, read watermarks, and previews
//! - **Migrations**: version-tracked SQL schema embedded at compile time

#![deny(unsafe_code)]

pub mod errors;
pub mod sqlite;
pub mod store;

pub use errors::{Result, StoreError};
pub use sqlite::connection::ConnectionConfig;
pub use store::{ChatStore, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT, SqliteChatStore, clamp_page};
