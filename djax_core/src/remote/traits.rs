use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{ContentImage, EventSchedule, InboxEntry, RemoteEvent, TriggerRequest};
use crate::Result;
use crate::models::Fields;

/// Remote content library.
///
/// `content_type` arguments are the registry's type names; implementations slugify
/// them for the wire.
#[async_trait]
pub trait ContentApi: Send + Sync {
    async fn get_content(&self, content_type: &str, key: &str) -> Result<ContentImage>;

    async fn get_content_by_unique_field(
        &self,
        content_type: &str,
        field_name: &str,
        field_value: &str,
    ) -> Result<ContentImage>;

    /// Create a content item and return its key.
    async fn create_content(&self, content_type: &str, fields: &Fields) -> Result<String>;

    async fn update_content(&self, content_type: &str, key: &str, fields: &Fields) -> Result<()>;

    async fn content_keys(&self, content_type: &str) -> Result<Vec<String>>;

    /// Time of the last remote change, `None` when the platform does not report one.
    async fn latest_update(&self, content_type: &str, key: &str)
    -> Result<Option<DateTime<Utc>>>;

    async fn search(&self, query: &str, content_types: &[String]) -> Result<Vec<ContentImage>>;

    async fn delete_content(&self, content_type: &str, key: &str) -> Result<()>;

    async fn tag_content(&self, content_type: &str, key: &str, tag: &str) -> Result<()>;

    async fn detag_content(&self, content_type: &str, key: &str, tag: &str) -> Result<()>;

    async fn reindex_content(&self, content_type: &str, key: &str) -> Result<()>;
}

#[async_trait]
pub trait CalendarApi: Send + Sync {
    /// Create an event (backed by a content item) and return its content key.
    async fn create_event(
        &self,
        calendar: &str,
        event_type: &str,
        schedule: &EventSchedule,
        content: &Fields,
    ) -> Result<String>;

    async fn update_event(
        &self,
        calendar: &str,
        event_key: &str,
        event_type: &str,
        schedule: &EventSchedule,
        content: &Fields,
    ) -> Result<()>;

    async fn delete_event(&self, calendar: &str, event_key: &str) -> Result<()>;

    /// Create a resource profile and return its key.
    async fn create_resource(&self, calendar: &str, attributes: &Fields) -> Result<String>;

    async fn update_resource(
        &self,
        calendar: &str,
        resource_key: &str,
        attributes: &Fields,
    ) -> Result<()>;

    /// Events booked against a resource inside `[start, end)`.
    async fn resource_events(
        &self,
        calendar: &str,
        resource_key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RemoteEvent>>;
}

#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn create_recipient(
        &self,
        message_bus: &str,
        recipient_type: &str,
        content: &Fields,
    ) -> Result<String>;

    async fn update_recipient(&self, recipient_key: &str, content: &Fields) -> Result<()>;

    async fn delete_recipient(&self, recipient_key: &str) -> Result<()>;

    async fn create_message(
        &self,
        message_bus: &str,
        message_type: &str,
        sender_key: &str,
        content: &Fields,
    ) -> Result<String>;

    async fn delete_message(&self, message_key: &str) -> Result<()>;

    async fn publish_message(&self, message_key: &str, topic: &str) -> Result<()>;

    async fn send_message(&self, message_key: &str, recipient_key: &str) -> Result<()>;

    async fn inbox(&self, recipient_key: &str, unread_only: bool) -> Result<Vec<InboxEntry>>;

    async fn update_received_message(
        &self,
        recipient_key: &str,
        message_key: &str,
        read: bool,
    ) -> Result<()>;

    async fn delete_received_message(&self, recipient_key: &str, message_key: &str)
    -> Result<()>;

    async fn mark_all_read(&self, recipient_key: &str) -> Result<()>;

    async fn subscribe(&self, recipient_key: &str, topic: &str) -> Result<()>;

    async fn unsubscribe(&self, recipient_key: &str, topic: &str) -> Result<()>;
}

#[async_trait]
pub trait TriggerApi: Send + Sync {
    async fn trigger(&self, request: &TriggerRequest) -> Result<()>;

    /// Allocate an anonymous profile id for triggers and channels.
    async fn profile(&self) -> Result<String>;
}
