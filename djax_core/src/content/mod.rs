//! Content reconciliation between local rows and remote content items.
//!
//! - `ContentRecords`: per-row operations (pull, push, staleness checks, passthroughs)
//! - `ContentSync`: whole-registry passes guarded by the sync lock

pub mod records;
pub mod sync;

pub use records::{ContentRecords, PushOutcome, Synced};
pub use sync::{ContentSync, ItemOutcome, SyncOutcome, SyncReport};
