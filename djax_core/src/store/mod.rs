//! Persistence for Content Records, the sync lock, calendar/messaging key tables,
//! auth tokens, and the application's local rows.

pub mod memory;
pub mod sqlite;
pub mod traits;

pub use memory::MemorySyncDb;
pub use sqlite::SqliteSyncDb;
pub use traits::{CalendarStore, LocalStore, MessagingStore, RecordStore, SyncDb, TokenStore};
