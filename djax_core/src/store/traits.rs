use async_trait::async_trait;
use uuid::Uuid;

use crate::Result;
use crate::calendar::models::{CalendarEvent, CalendarResource};
use crate::messaging::models::{Message, ReceivedMessage, Recipient};
use crate::models::{AuthToken, ContentRecord, Fields, LocalRef, LocalRow, SyncLock};

/// The application's own rows, addressed by `(local_type, local_id)`.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Insert a new row and allocate its id.
    async fn insert_row(&self, local_type: &str, fields: &Fields) -> Result<LocalRow>;

    async fn get_row(&self, local: &LocalRef) -> Result<Option<LocalRow>>;

    /// Overwrite an existing row. `NotFound` when the row does not exist.
    async fn save_row(&self, row: &LocalRow) -> Result<()>;

    async fn list_rows(&self, local_type: &str) -> Result<Vec<LocalRow>>;

    async fn delete_row(&self, local: &LocalRef) -> Result<()>;
}

/// Content Record ledger plus the sync lock.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// `Conflict` when either uniqueness constraint would be violated.
    async fn insert_record(&self, record: &ContentRecord) -> Result<()>;

    async fn update_record(&self, record: &ContentRecord) -> Result<()>;

    async fn record_for_local(&self, local: &LocalRef) -> Result<Option<ContentRecord>>;

    async fn record_for_remote(
        &self,
        remote_type: &str,
        remote_key: &str,
    ) -> Result<Option<ContentRecord>>;

    async fn delete_record(&self, id: Uuid) -> Result<()>;

    async fn list_records(&self, remote_type: Option<&str>) -> Result<Vec<ContentRecord>>;

    /// Atomic insert-if-absent. With a TTL, a lock older than the TTL is replaced.
    ///
    /// Returns `false` when another live lock is held.
    async fn try_acquire_lock(&self, lock: &SyncLock, ttl: Option<chrono::Duration>)
    -> Result<bool>;

    async fn current_lock(&self) -> Result<Option<SyncLock>>;

    /// Release the lock if `token` still holds it.
    async fn release_lock(&self, token: &str) -> Result<()>;

    /// Remove every lock row. Returns how many were removed.
    async fn clear_locks(&self) -> Result<u64>;
}

#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// Insert or replace the event for the event's local ref.
    async fn upsert_calendar_event(&self, event: &CalendarEvent) -> Result<()>;

    async fn calendar_event_for_local(&self, local: &LocalRef) -> Result<Option<CalendarEvent>>;

    async fn delete_calendar_event(&self, local: &LocalRef) -> Result<()>;

    /// Insert or replace by local ref. `Conflict` when the resource key belongs to another row.
    async fn upsert_calendar_resource(&self, resource: &CalendarResource) -> Result<()>;

    async fn calendar_resource_for_local(
        &self,
        local: &LocalRef,
    ) -> Result<Option<CalendarResource>>;

    async fn delete_calendar_resource(&self, local: &LocalRef) -> Result<()>;
}

#[async_trait]
pub trait MessagingStore: Send + Sync {
    async fn insert_recipient(&self, recipient: &Recipient) -> Result<()>;

    async fn recipient_for_local(&self, local: &LocalRef) -> Result<Option<Recipient>>;

    async fn recipient_by_key(&self, recipient_key: &str) -> Result<Option<Recipient>>;

    /// Also removes the recipient's receipts.
    async fn delete_recipient(&self, id: Uuid) -> Result<()>;

    async fn insert_message(&self, message: &Message) -> Result<()>;

    async fn message_for_local(&self, local: &LocalRef) -> Result<Option<Message>>;

    async fn message_by_key(&self, message_key: &str) -> Result<Option<Message>>;

    /// Also removes the message's receipts.
    async fn delete_message(&self, id: Uuid) -> Result<()>;

    /// Get-or-create the receipt for `(message, recipient)` and set its unread flag.
    async fn ensure_received(
        &self,
        message_id: Uuid,
        recipient_id: Uuid,
        unread: bool,
    ) -> Result<ReceivedMessage>;

    async fn received_for_recipient(&self, recipient_id: Uuid) -> Result<Vec<ReceivedMessage>>;

    async fn update_received(&self, received: &ReceivedMessage) -> Result<()>;

    async fn delete_received(&self, message_id: Uuid, recipient_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_auth_token(&self, token: &AuthToken) -> Result<()>;

    async fn auth_token_by_id(&self, id: Uuid) -> Result<Option<AuthToken>>;

    async fn list_auth_tokens(&self) -> Result<Vec<AuthToken>>;

    async fn delete_auth_token(&self, id: Uuid) -> Result<()>;
}

/// Everything Djax persists about the local↔remote binding.
pub trait SyncDb: RecordStore + CalendarStore + MessagingStore + TokenStore {}

impl<T> SyncDb for T where T: RecordStore + CalendarStore + MessagingStore + TokenStore {}
