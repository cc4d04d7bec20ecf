//! # palaver-server
//!
//! Real-time one-to-one chat over WebSockets.
//!
//! - **Router**: per-connection frame decoding, handler dispatch, and a single serialized writer
//! - **Session**: per-user business logic (send, open and close conversations, read receipts)
//! - **Hub**: process-wide presence registry with last-connection-wins eviction
//! - **Server**: Axum routes for `/ws`, `/health`, `/metrics`, and the read-only chat REST API, with JWT auth

#![deny(unsafe_code)]

pub mod auth;
pub mod connection;
pub mod handlers;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod router;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod transport;

pub use auth::{Authenticator, JwtAuthenticator};
pub use hub::PresenceHub;
pub use router::{EventRouter, Frame, Outbox, RouterConfig};
pub use server::ChatServer;
pub use session::{ChatSession, SessionHandle};
