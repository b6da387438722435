//! Messaging extension: recipients, messages and inbox receipts on the remote
//! message bus.

pub mod engine;
pub mod models;

pub use engine::Messaging;
pub use models::{Message, ReceivedMessage, Recipient};
