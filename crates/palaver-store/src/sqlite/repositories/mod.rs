//! Stateless repositories. Each takes a `&Connection` so callers control
//! pooling and transactions.

pub mod chat_status;
pub mod message;
pub mod preview;

pub use chat_status::ChatStatusRepo;
pub use message::MessageRepo;
pub use preview::PreviewRepo;
