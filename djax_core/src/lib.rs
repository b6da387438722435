//! Djax core library: binds local rows to remote Axilent content.

pub mod calendar;
pub mod config;
pub mod content;
pub mod error;
pub mod field_map;
pub mod messaging;
pub mod models;
pub mod o11y;
pub mod registry;
pub mod remote;
pub mod store;
pub mod triggers;

#[cfg(test)]
mod test_support;

pub use calendar::{CalendarEvent, CalendarResource, CalendarSync};
pub use config::{AxilentConfig, SyncConfig};
pub use content::{ContentRecords, ContentSync, ItemOutcome, PushOutcome, SyncOutcome, SyncReport};
pub use error::{Error, Result};
pub use field_map::{FieldKind, FieldMapping, FieldMappingError};
pub use messaging::{Message, Messaging, ReceivedMessage, Recipient};
pub use models::{AuthToken, ContentRecord, Fields, LocalRef, LocalRow, SyncLock};
pub use registry::{ContentBinding, ContentDescriptor, ContentModel, Registry, RegistryBuilder};
pub use store::{MemorySyncDb, SqliteSyncDb, SyncDb};
pub use triggers::{Trigger, TriggerMap};
