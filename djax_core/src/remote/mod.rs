//! Remote platform boundary.
//!
//! The core never speaks HTTP itself: everything remote goes through the traits in
//! `traits`. `djax_integrations` provides the reqwest-backed client; `memory` holds an
//! in-process fake for local development and unit tests.

pub mod memory;
pub mod models;
pub mod traits;

pub use memory::MemoryAxilent;
pub use models::{
    ContentImage, EventSchedule, InboxEntry, RecurrenceUnit, RemoteEvent, TriggerRequest,
};
pub use traits::{CalendarApi, ContentApi, MessagingApi, TriggerApi};

/// Wire form of a content type name: non-word characters dropped, trimmed, lowercased.
pub fn slugify(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_lowercase()
}
