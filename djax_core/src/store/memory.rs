use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::traits::{CalendarStore, LocalStore, MessagingStore, RecordStore, TokenStore};
use crate::calendar::models::{CalendarEvent, CalendarResource};
use crate::messaging::models::{Message, ReceivedMessage, Recipient};
use crate::models::{AuthToken, ContentRecord, Fields, LocalRef, LocalRow, SyncLock};
use crate::{Error, Result};

#[derive(Default)]
struct Inner {
    rows: BTreeMap<LocalRef, Fields>,
    next_row_id: HashMap<String, i64>,

    records: BTreeMap<Uuid, ContentRecord>,
    lock: Option<SyncLock>,

    events: BTreeMap<LocalRef, CalendarEvent>,
    resources: BTreeMap<LocalRef, CalendarResource>,

    recipients: BTreeMap<Uuid, Recipient>,
    messages: BTreeMap<Uuid, Message>,
    received: Vec<ReceivedMessage>,

    tokens: BTreeMap<Uuid, AuthToken>,
}

/// In-memory store for local development and unit tests.
///
/// Implements both the Djax tables (`SyncDb`) and the application rows
/// (`LocalStore`), enforcing the same uniqueness rules as the SQLite store.
#[derive(Clone, Default)]
pub struct MemorySyncDb {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySyncDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of local rows of one type (primarily for tests).
    pub async fn row_count(&self, local_type: &str) -> usize {
        let inner = self.inner.lock().await;
        inner
            .rows
            .keys()
            .filter(|r| r.local_type == local_type)
            .count()
    }
}

#[async_trait]
impl LocalStore for MemorySyncDb {
    async fn insert_row(&self, local_type: &str, fields: &Fields) -> Result<LocalRow> {
        if local_type.trim().is_empty() {
            return Err(Error::InvalidInput("local_type is empty".to_string()));
        }
        let mut inner = self.inner.lock().await;
        let next = inner.next_row_id.entry(local_type.to_string()).or_insert(0);
        *next += 1;
        let local_id = *next;
        inner
            .rows
            .insert(LocalRef::new(local_type, local_id), fields.clone());
        Ok(LocalRow {
            local_type: local_type.to_string(),
            local_id,
            fields: fields.clone(),
        })
    }

    async fn get_row(&self, local: &LocalRef) -> Result<Option<LocalRow>> {
        let inner = self.inner.lock().await;
        Ok(inner.rows.get(local).map(|fields| LocalRow {
            local_type: local.local_type.clone(),
            local_id: local.local_id,
            fields: fields.clone(),
        }))
    }

    async fn save_row(&self, row: &LocalRow) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.rows.get_mut(&row.local_ref()) {
            Some(fields) => {
                *fields = row.fields.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("local row {}", row.local_ref()))),
        }
    }

    async fn list_rows(&self, local_type: &str) -> Result<Vec<LocalRow>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .rows
            .iter()
            .filter(|(r, _)| r.local_type == local_type)
            .map(|(r, fields)| LocalRow {
                local_type: r.local_type.clone(),
                local_id: r.local_id,
                fields: fields.clone(),
            })
            .collect())
    }

    async fn delete_row(&self, local: &LocalRef) -> Result<()> {
        self.inner.lock().await.rows.remove(local);
        Ok(())
    }
}

fn record_clash(existing: &ContentRecord, record: &ContentRecord) -> Option<String> {
    if existing.id == record.id {
        return None;
    }
    if existing.local_type == record.local_type && existing.local_id == record.local_id {
        return Some(format!("{} already has a content record", record.local_ref()));
    }
    if existing.remote_type == record.remote_type && existing.remote_key == record.remote_key {
        return Some(format!(
            "{} is already bound to {}",
            record.link(),
            existing.local_ref()
        ));
    }
    None
}

#[async_trait]
impl RecordStore for MemorySyncDb {
    async fn insert_record(&self, record: &ContentRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.records.contains_key(&record.id) {
            return Err(Error::Conflict(format!("content record {} exists", record.id)));
        }
        if let Some(msg) = inner.records.values().find_map(|e| record_clash(e, record)) {
            return Err(Error::Conflict(msg));
        }
        inner.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn update_record(&self, record: &ContentRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.records.contains_key(&record.id) {
            return Err(Error::NotFound(format!("content record {}", record.id)));
        }
        if let Some(msg) = inner.records.values().find_map(|e| record_clash(e, record)) {
            return Err(Error::Conflict(msg));
        }
        inner.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn record_for_local(&self, local: &LocalRef) -> Result<Option<ContentRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .records
            .values()
            .find(|r| r.local_type == local.local_type && r.local_id == local.local_id)
            .cloned())
    }

    async fn record_for_remote(
        &self,
        remote_type: &str,
        remote_key: &str,
    ) -> Result<Option<ContentRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .records
            .values()
            .find(|r| r.remote_type == remote_type && r.remote_key == remote_key)
            .cloned())
    }

    async fn delete_record(&self, id: Uuid) -> Result<()> {
        self.inner.lock().await.records.remove(&id);
        Ok(())
    }

    async fn list_records(&self, remote_type: Option<&str>) -> Result<Vec<ContentRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .records
            .values()
            .filter(|r| remote_type.is_none_or(|t| r.remote_type == t))
            .cloned()
            .collect())
    }

    async fn try_acquire_lock(
        &self,
        lock: &SyncLock,
        ttl: Option<chrono::Duration>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = &inner.lock {
            if !existing.is_expired(ttl, Utc::now()) {
                return Ok(false);
            }
            tracing::warn!(
                token = %existing.token,
                acquired_at = %existing.acquired_at,
                "replacing expired sync lock"
            );
        }
        inner.lock = Some(lock.clone());
        Ok(true)
    }

    async fn current_lock(&self) -> Result<Option<SyncLock>> {
        Ok(self.inner.lock().await.lock.clone())
    }

    async fn release_lock(&self, token: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.lock.as_ref().is_some_and(|l| l.token == token) {
            inner.lock = None;
        }
        Ok(())
    }

    async fn clear_locks(&self) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        Ok(u64::from(inner.lock.take().is_some()))
    }
}

#[async_trait]
impl CalendarStore for MemorySyncDb {
    async fn upsert_calendar_event(&self, event: &CalendarEvent) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.events.insert(event.local_ref(), event.clone());
        Ok(())
    }

    async fn calendar_event_for_local(&self, local: &LocalRef) -> Result<Option<CalendarEvent>> {
        Ok(self.inner.lock().await.events.get(local).cloned())
    }

    async fn delete_calendar_event(&self, local: &LocalRef) -> Result<()> {
        self.inner.lock().await.events.remove(local);
        Ok(())
    }

    async fn upsert_calendar_resource(&self, resource: &CalendarResource) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let local = resource.local_ref();
        if let Some((other, _)) = inner
            .resources
            .iter()
            .find(|(r, existing)| **r != local && existing.resource_key == resource.resource_key)
        {
            return Err(Error::Conflict(format!(
                "resource {} is already bound to {other}",
                resource.resource_key
            )));
        }
        inner.resources.insert(local, resource.clone());
        Ok(())
    }

    async fn calendar_resource_for_local(
        &self,
        local: &LocalRef,
    ) -> Result<Option<CalendarResource>> {
        Ok(self.inner.lock().await.resources.get(local).cloned())
    }

    async fn delete_calendar_resource(&self, local: &LocalRef) -> Result<()> {
        self.inner.lock().await.resources.remove(local);
        Ok(())
    }
}

#[async_trait]
impl MessagingStore for MemorySyncDb {
    async fn insert_recipient(&self, recipient: &Recipient) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let clash = inner.recipients.values().any(|r| {
            r.recipient_key == recipient.recipient_key
                || (r.local_type == recipient.local_type && r.local_id == recipient.local_id)
        });
        if clash {
            return Err(Error::Conflict(format!(
                "recipient {} already exists for {}",
                recipient.recipient_key,
                recipient.local_ref()
            )));
        }
        inner.recipients.insert(recipient.id, recipient.clone());
        Ok(())
    }

    async fn recipient_for_local(&self, local: &LocalRef) -> Result<Option<Recipient>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .recipients
            .values()
            .find(|r| r.local_type == local.local_type && r.local_id == local.local_id)
            .cloned())
    }

    async fn recipient_by_key(&self, recipient_key: &str) -> Result<Option<Recipient>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .recipients
            .values()
            .find(|r| r.recipient_key == recipient_key)
            .cloned())
    }

    async fn delete_recipient(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.recipients.remove(&id);
        inner.received.retain(|r| r.recipient_id != id);
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let clash = inner.messages.values().any(|m| {
            m.message_key == message.message_key
                || (m.local_type == message.local_type && m.local_id == message.local_id)
        });
        if clash {
            return Err(Error::Conflict(format!(
                "message {} already exists for {}",
                message.message_key,
                message.local_ref()
            )));
        }
        inner.messages.insert(message.id, message.clone());
        Ok(())
    }

    async fn message_for_local(&self, local: &LocalRef) -> Result<Option<Message>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .messages
            .values()
            .find(|m| m.local_type == local.local_type && m.local_id == local.local_id)
            .cloned())
    }

    async fn message_by_key(&self, message_key: &str) -> Result<Option<Message>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .messages
            .values()
            .find(|m| m.message_key == message_key)
            .cloned())
    }

    async fn delete_message(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.messages.remove(&id);
        inner.received.retain(|r| r.message_id != id);
        Ok(())
    }

    async fn ensure_received(
        &self,
        message_id: Uuid,
        recipient_id: Uuid,
        unread: bool,
    ) -> Result<ReceivedMessage> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner
            .received
            .iter_mut()
            .find(|r| r.message_id == message_id && r.recipient_id == recipient_id)
        {
            existing.unread = unread;
            return Ok(existing.clone());
        }
        let received = ReceivedMessage {
            id: Uuid::new_v4(),
            message_id,
            recipient_id,
            unread,
        };
        inner.received.push(received.clone());
        Ok(received)
    }

    async fn received_for_recipient(&self, recipient_id: Uuid) -> Result<Vec<ReceivedMessage>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .received
            .iter()
            .filter(|r| r.recipient_id == recipient_id)
            .cloned()
            .collect())
    }

    async fn update_received(&self, received: &ReceivedMessage) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.received.iter_mut().find(|r| r.id == received.id) {
            Some(existing) => {
                *existing = received.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("received message {}", received.id))),
        }
    }

    async fn delete_received(&self, message_id: Uuid, recipient_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .received
            .retain(|r| !(r.message_id == message_id && r.recipient_id == recipient_id));
        Ok(())
    }
}

#[async_trait]
impl TokenStore for MemorySyncDb {
    async fn insert_auth_token(&self, token: &AuthToken) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.tokens.values().any(|t| t.id == token.id || t.name == token.name) {
            return Err(Error::Conflict(format!("auth token '{}' exists", token.name)));
        }
        inner.tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn auth_token_by_id(&self, id: Uuid) -> Result<Option<AuthToken>> {
        Ok(self.inner.lock().await.tokens.get(&id).cloned())
    }

    async fn list_auth_tokens(&self) -> Result<Vec<AuthToken>> {
        Ok(self.inner.lock().await.tokens.values().cloned().collect())
    }

    async fn delete_auth_token(&self, id: Uuid) -> Result<()> {
        self.inner.lock().await.tokens.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn record_uniqueness_is_enforced_both_ways() {
        let db = MemorySyncDb::new();
        let a = LocalRef::new("example.article", 1);
        let b = LocalRef::new("example.article", 2);

        db.insert_record(&ContentRecord::new(&a, "Article", "k1", None).unwrap())
            .await
            .unwrap();

        let same_local = ContentRecord::new(&a, "Article", "k2", None).unwrap();
        assert!(matches!(
            db.insert_record(&same_local).await,
            Err(Error::Conflict(_))
        ));

        let same_remote = ContentRecord::new(&b, "Article", "k1", None).unwrap();
        assert!(matches!(
            db.insert_record(&same_remote).await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let db = MemorySyncDb::new();
        let now = Utc::now();
        assert!(db.try_acquire_lock(&SyncLock::new("a", now), None).await.unwrap());
        assert!(!db.try_acquire_lock(&SyncLock::new("b", now), None).await.unwrap());

        db.release_lock("b").await.unwrap();
        assert!(db.current_lock().await.unwrap().is_some());

        db.release_lock("a").await.unwrap();
        assert!(db.try_acquire_lock(&SyncLock::new("b", now), None).await.unwrap());
        assert_eq!(db.clear_locks().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_lock_is_replaced_only_with_ttl() {
        let db = MemorySyncDb::new();
        let old = Utc::now() - Duration::hours(2);
        db.try_acquire_lock(&SyncLock::new("stale", old), None)
            .await
            .unwrap();

        let fresh = SyncLock::new("fresh", Utc::now());
        assert!(!db.try_acquire_lock(&fresh, None).await.unwrap());
        assert!(
            db.try_acquire_lock(&fresh, Some(Duration::minutes(30)))
                .await
                .unwrap()
        );
        assert_eq!(db.current_lock().await.unwrap().unwrap().token, "fresh");
    }

    #[tokio::test]
    async fn rows_get_sequential_ids_per_type() {
        let db = MemorySyncDb::new();
        let r1 = db.insert_row("a", &Fields::new()).await.unwrap();
        let r2 = db.insert_row("a", &Fields::new()).await.unwrap();
        let r3 = db.insert_row("b", &Fields::new()).await.unwrap();
        assert_eq!((r1.local_id, r2.local_id, r3.local_id), (1, 2, 1));

        let missing = LocalRow {
            local_type: "a".into(),
            local_id: 99,
            fields: Fields::new(),
        };
        assert!(matches!(db.save_row(&missing).await, Err(Error::NotFound(_))));
    }
}
