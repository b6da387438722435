use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::models::{ContentImage, EventSchedule, InboxEntry, RemoteEvent, TriggerRequest};
use super::slugify;
use super::traits::{CalendarApi, ContentApi, MessagingApi, TriggerApi};
use crate::models::Fields;
use crate::{Error, Result};

type ItemKey = (String, String);

#[derive(Debug, Clone)]
struct StoredEvent {
    calendar: String,
    event_type: String,
    schedule: EventSchedule,
    content: Fields,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    sender_key: String,
    content: Fields,
}

#[derive(Default)]
struct State {
    content: BTreeMap<ItemKey, Fields>,
    updated: HashMap<ItemKey, Option<DateTime<Utc>>>,
    tags: HashMap<ItemKey, BTreeSet<String>>,
    reindexed: Vec<ItemKey>,
    failing_types: HashSet<String>,

    events: BTreeMap<String, StoredEvent>,
    resources: BTreeMap<String, (String, Fields)>,
    resource_events: HashMap<String, Vec<RemoteEvent>>,

    recipients: BTreeMap<String, Fields>,
    messages: BTreeMap<String, StoredMessage>,
    inboxes: HashMap<String, Vec<InboxEntry>>,
    subscriptions: HashMap<String, BTreeSet<String>>,

    triggers: Vec<TriggerRequest>,
    next_key: u64,
}

impl State {
    fn next_key(&mut self, prefix: &str) -> String {
        self.next_key += 1;
        format!("{prefix}-{}", self.next_key)
    }

    fn require_recipient(&self, recipient_key: &str) -> Result<()> {
        if self.recipients.contains_key(recipient_key) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("recipient {recipient_key}")))
        }
    }

    fn require_message(&self, message_key: &str) -> Result<()> {
        if self.messages.contains_key(message_key) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("message {message_key}")))
        }
    }

    fn deliver(&mut self, recipient_key: &str, message_key: &str) {
        let inbox = self.inboxes.entry(recipient_key.to_string()).or_default();
        if !inbox.iter().any(|e| e.message_key == message_key) {
            inbox.push(InboxEntry {
                message_key: message_key.to_string(),
                unread: true,
            });
        }
    }
}

/// In-memory stand-in for the remote platform, for local development and unit tests.
///
/// Content is keyed by slugified content type, like the real API. Every trait call
/// increments `calls()`, which tests use to assert that nothing went remote.
#[derive(Clone, Default)]
pub struct MemoryAxilent {
    state: Arc<Mutex<State>>,
    calls: Arc<AtomicUsize>,
}

impl MemoryAxilent {
    pub fn new() -> Self {
        Self::default()
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn item(content_type: &str, key: &str) -> ItemKey {
        (slugify(content_type), key.to_string())
    }

    /// Number of remote API calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Seed a content item; its latest update is "now".
    pub async fn put_content(&self, content_type: &str, key: &str, data: Fields) {
        let mut st = self.state.lock().await;
        let item = Self::item(content_type, key);
        st.updated.insert(item.clone(), Some(Utc::now()));
        st.content.insert(item, data);
    }

    pub async fn set_latest_update(
        &self,
        content_type: &str,
        key: &str,
        at: Option<DateTime<Utc>>,
    ) {
        let mut st = self.state.lock().await;
        st.updated.insert(Self::item(content_type, key), at);
    }

    pub async fn content(&self, content_type: &str, key: &str) -> Option<Fields> {
        let st = self.state.lock().await;
        st.content.get(&Self::item(content_type, key)).cloned()
    }

    pub async fn tags(&self, content_type: &str, key: &str) -> BTreeSet<String> {
        let st = self.state.lock().await;
        st.tags
            .get(&Self::item(content_type, key))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn reindexed(&self) -> Vec<(String, String)> {
        self.state.lock().await.reindexed.clone()
    }

    /// Make every call touching `content_type` fail with a remote error.
    pub async fn fail_content_type(&self, content_type: &str) {
        let mut st = self.state.lock().await;
        st.failing_types.insert(slugify(content_type));
    }

    pub async fn add_resource_event(&self, resource_key: &str, event: RemoteEvent) {
        let mut st = self.state.lock().await;
        st.resource_events
            .entry(resource_key.to_string())
            .or_default()
            .push(event);
    }

    pub async fn event(&self, event_key: &str) -> Option<(String, EventSchedule, Fields)> {
        let st = self.state.lock().await;
        st.events
            .get(event_key)
            .map(|e| (e.calendar.clone(), e.schedule.clone(), e.content.clone()))
    }

    pub async fn event_type(&self, event_key: &str) -> Option<String> {
        let st = self.state.lock().await;
        st.events.get(event_key).map(|e| e.event_type.clone())
    }

    pub async fn resource(&self, resource_key: &str) -> Option<Fields> {
        let st = self.state.lock().await;
        st.resources.get(resource_key).map(|(_, attrs)| attrs.clone())
    }

    pub async fn recipient(&self, recipient_key: &str) -> Option<Fields> {
        self.state.lock().await.recipients.get(recipient_key).cloned()
    }

    pub async fn message_sender(&self, message_key: &str) -> Option<String> {
        let st = self.state.lock().await;
        st.messages.get(message_key).map(|m| m.sender_key.clone())
    }

    pub async fn message_content(&self, message_key: &str) -> Option<Fields> {
        let st = self.state.lock().await;
        st.messages.get(message_key).map(|m| m.content.clone())
    }

    pub async fn subscriptions(&self, recipient_key: &str) -> BTreeSet<String> {
        let st = self.state.lock().await;
        st.subscriptions
            .get(recipient_key)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn fired_triggers(&self) -> Vec<TriggerRequest> {
        self.state.lock().await.triggers.clone()
    }

    fn check_type(st: &State, content_type: &str) -> Result<()> {
        if st.failing_types.contains(&slugify(content_type)) {
            return Err(Error::remote(Some(503), format!("{content_type} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentApi for MemoryAxilent {
    async fn get_content(&self, content_type: &str, key: &str) -> Result<ContentImage> {
        self.hit();
        let st = self.state.lock().await;
        Self::check_type(&st, content_type)?;
        let data = st
            .content
            .get(&Self::item(content_type, key))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("content {content_type}:{key}")))?;
        Ok(ContentImage::new(content_type, key, data))
    }

    async fn get_content_by_unique_field(
        &self,
        content_type: &str,
        field_name: &str,
        field_value: &str,
    ) -> Result<ContentImage> {
        self.hit();
        let st = self.state.lock().await;
        Self::check_type(&st, content_type)?;
        let slug = slugify(content_type);
        st.content
            .iter()
            .find(|((ct, _), data)| {
                *ct == slug
                    && data
                        .get(field_name)
                        .and_then(|v| v.as_str())
                        .is_some_and(|v| v == field_value)
            })
            .map(|((_, key), data)| ContentImage::new(content_type, key.clone(), data.clone()))
            .ok_or_else(|| {
                Error::NotFound(format!("{content_type} with {field_name}={field_value}"))
            })
    }

    async fn create_content(&self, content_type: &str, fields: &Fields) -> Result<String> {
        self.hit();
        let mut st = self.state.lock().await;
        Self::check_type(&st, content_type)?;
        let key = st.next_key(&slugify(content_type));
        let item = Self::item(content_type, &key);
        st.updated.insert(item.clone(), Some(Utc::now()));
        st.content.insert(item, fields.clone());
        Ok(key)
    }

    async fn update_content(&self, content_type: &str, key: &str, fields: &Fields) -> Result<()> {
        self.hit();
        let mut st = self.state.lock().await;
        Self::check_type(&st, content_type)?;
        let item = Self::item(content_type, key);
        match st.content.get_mut(&item) {
            Some(data) => {
                for (k, v) in fields {
                    data.insert(k.clone(), v.clone());
                }
            }
            None => return Err(Error::NotFound(format!("content {content_type}:{key}"))),
        }
        st.updated.insert(item, Some(Utc::now()));
        Ok(())
    }

    async fn content_keys(&self, content_type: &str) -> Result<Vec<String>> {
        self.hit();
        let st = self.state.lock().await;
        Self::check_type(&st, content_type)?;
        let slug = slugify(content_type);
        Ok(st
            .content
            .keys()
            .filter(|(ct, _)| *ct == slug)
            .map(|(_, key)| key.clone())
            .collect())
    }

    async fn latest_update(
        &self,
        content_type: &str,
        key: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        self.hit();
        let st = self.state.lock().await;
        Self::check_type(&st, content_type)?;
        let item = Self::item(content_type, key);
        if !st.content.contains_key(&item) {
            return Err(Error::NotFound(format!("content {content_type}:{key}")));
        }
        Ok(st.updated.get(&item).copied().flatten())
    }

    async fn search(&self, query: &str, content_types: &[String]) -> Result<Vec<ContentImage>> {
        self.hit();
        let st = self.state.lock().await;
        let wanted: HashSet<String> = content_types.iter().map(|t| slugify(t)).collect();
        let needle = query.to_lowercase();
        let mut out = Vec::new();
        for ((ct, key), data) in &st.content {
            if !wanted.is_empty() && !wanted.contains(ct) {
                continue;
            }
            let hits = data
                .values()
                .filter_map(|v| v.as_str())
                .filter(|s| s.to_lowercase().contains(&needle))
                .count();
            if hits > 0 {
                let mut image = ContentImage::new(ct.clone(), key.clone(), data.clone());
                image.endorsement = hits as f64;
                out.push(image);
            }
        }
        out.sort_by(|a, b| b.endorsement.total_cmp(&a.endorsement));
        Ok(out)
    }

    async fn delete_content(&self, content_type: &str, key: &str) -> Result<()> {
        self.hit();
        let mut st = self.state.lock().await;
        Self::check_type(&st, content_type)?;
        let item = Self::item(content_type, key);
        if st.content.remove(&item).is_none() {
            return Err(Error::NotFound(format!("content {content_type}:{key}")));
        }
        st.updated.remove(&item);
        st.tags.remove(&item);
        Ok(())
    }

    async fn tag_content(&self, content_type: &str, key: &str, tag: &str) -> Result<()> {
        self.hit();
        let mut st = self.state.lock().await;
        let item = Self::item(content_type, key);
        if !st.content.contains_key(&item) {
            return Err(Error::NotFound(format!("content {content_type}:{key}")));
        }
        st.tags.entry(item).or_default().insert(tag.to_string());
        Ok(())
    }

    async fn detag_content(&self, content_type: &str, key: &str, tag: &str) -> Result<()> {
        self.hit();
        let mut st = self.state.lock().await;
        if let Some(tags) = st.tags.get_mut(&Self::item(content_type, key)) {
            tags.remove(tag);
        }
        Ok(())
    }

    async fn reindex_content(&self, content_type: &str, key: &str) -> Result<()> {
        self.hit();
        let mut st = self.state.lock().await;
        let item = Self::item(content_type, key);
        if !st.content.contains_key(&item) {
            return Err(Error::NotFound(format!("content {content_type}:{key}")));
        }
        st.reindexed.push(item);
        Ok(())
    }
}

#[async_trait]
impl CalendarApi for MemoryAxilent {
    async fn create_event(
        &self,
        calendar: &str,
        event_type: &str,
        schedule: &EventSchedule,
        content: &Fields,
    ) -> Result<String> {
        self.hit();
        let mut st = self.state.lock().await;
        let key = st.next_key("event");
        st.events.insert(
            key.clone(),
            StoredEvent {
                calendar: calendar.to_string(),
                event_type: event_type.to_string(),
                schedule: schedule.clone(),
                content: content.clone(),
            },
        );
        Ok(key)
    }

    async fn update_event(
        &self,
        calendar: &str,
        event_key: &str,
        event_type: &str,
        schedule: &EventSchedule,
        content: &Fields,
    ) -> Result<()> {
        self.hit();
        let mut st = self.state.lock().await;
        let ev = st
            .events
            .get_mut(event_key)
            .ok_or_else(|| Error::NotFound(format!("event {event_key}")))?;
        ev.calendar = calendar.to_string();
        ev.event_type = event_type.to_string();
        ev.schedule = schedule.clone();
        ev.content = content.clone();
        Ok(())
    }

    async fn delete_event(&self, _calendar: &str, event_key: &str) -> Result<()> {
        self.hit();
        let mut st = self.state.lock().await;
        st.events
            .remove(event_key)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("event {event_key}")))
    }

    async fn create_resource(&self, calendar: &str, attributes: &Fields) -> Result<String> {
        self.hit();
        let mut st = self.state.lock().await;
        let key = st.next_key("resource");
        st.resources
            .insert(key.clone(), (calendar.to_string(), attributes.clone()));
        Ok(key)
    }

    async fn update_resource(
        &self,
        calendar: &str,
        resource_key: &str,
        attributes: &Fields,
    ) -> Result<()> {
        self.hit();
        let mut st = self.state.lock().await;
        match st.resources.get_mut(resource_key) {
            Some(entry) => {
                *entry = (calendar.to_string(), attributes.clone());
                Ok(())
            }
            None => Err(Error::NotFound(format!("resource {resource_key}"))),
        }
    }

    async fn resource_events(
        &self,
        _calendar: &str,
        resource_key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RemoteEvent>> {
        self.hit();
        let st = self.state.lock().await;
        Ok(st
            .resource_events
            .get(resource_key)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.overlaps(start, end))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl MessagingApi for MemoryAxilent {
    async fn create_recipient(
        &self,
        _message_bus: &str,
        _recipient_type: &str,
        content: &Fields,
    ) -> Result<String> {
        self.hit();
        let mut st = self.state.lock().await;
        let key = st.next_key("recipient");
        st.recipients.insert(key.clone(), content.clone());
        Ok(key)
    }

    async fn update_recipient(&self, recipient_key: &str, content: &Fields) -> Result<()> {
        self.hit();
        let mut st = self.state.lock().await;
        st.require_recipient(recipient_key)?;
        st.recipients
            .insert(recipient_key.to_string(), content.clone());
        Ok(())
    }

    async fn delete_recipient(&self, recipient_key: &str) -> Result<()> {
        self.hit();
        let mut st = self.state.lock().await;
        st.require_recipient(recipient_key)?;
        st.recipients.remove(recipient_key);
        st.inboxes.remove(recipient_key);
        st.subscriptions.remove(recipient_key);
        Ok(())
    }

    async fn create_message(
        &self,
        _message_bus: &str,
        _message_type: &str,
        sender_key: &str,
        content: &Fields,
    ) -> Result<String> {
        self.hit();
        let mut st = self.state.lock().await;
        st.require_recipient(sender_key)?;
        let key = st.next_key("message");
        st.messages.insert(
            key.clone(),
            StoredMessage {
                sender_key: sender_key.to_string(),
                content: content.clone(),
            },
        );
        Ok(key)
    }

    async fn delete_message(&self, message_key: &str) -> Result<()> {
        self.hit();
        let mut st = self.state.lock().await;
        st.require_message(message_key)?;
        st.messages.remove(message_key);
        for inbox in st.inboxes.values_mut() {
            inbox.retain(|e| e.message_key != message_key);
        }
        Ok(())
    }

    async fn publish_message(&self, message_key: &str, topic: &str) -> Result<()> {
        self.hit();
        let mut st = self.state.lock().await;
        st.require_message(message_key)?;
        let subscribers: Vec<String> = st
            .subscriptions
            .iter()
            .filter(|(_, topics)| topics.contains(topic))
            .map(|(recipient, _)| recipient.clone())
            .collect();
        for recipient in subscribers {
            st.deliver(&recipient, message_key);
        }
        Ok(())
    }

    async fn send_message(&self, message_key: &str, recipient_key: &str) -> Result<()> {
        self.hit();
        let mut st = self.state.lock().await;
        st.require_message(message_key)?;
        st.require_recipient(recipient_key)?;
        st.deliver(recipient_key, message_key);
        Ok(())
    }

    async fn inbox(&self, recipient_key: &str, unread_only: bool) -> Result<Vec<InboxEntry>> {
        self.hit();
        let st = self.state.lock().await;
        st.require_recipient(recipient_key)?;
        Ok(st
            .inboxes
            .get(recipient_key)
            .map(|inbox| {
                inbox
                    .iter()
                    .filter(|e| !unread_only || e.unread)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_received_message(
        &self,
        recipient_key: &str,
        message_key: &str,
        read: bool,
    ) -> Result<()> {
        self.hit();
        let mut st = self.state.lock().await;
        let entry = st
            .inboxes
            .get_mut(recipient_key)
            .and_then(|inbox| inbox.iter_mut().find(|e| e.message_key == message_key))
            .ok_or_else(|| {
                Error::NotFound(format!("message {message_key} for {recipient_key}"))
            })?;
        entry.unread = !read;
        Ok(())
    }

    async fn delete_received_message(
        &self,
        recipient_key: &str,
        message_key: &str,
    ) -> Result<()> {
        self.hit();
        let mut st = self.state.lock().await;
        if let Some(inbox) = st.inboxes.get_mut(recipient_key) {
            inbox.retain(|e| e.message_key != message_key);
        }
        Ok(())
    }

    async fn mark_all_read(&self, recipient_key: &str) -> Result<()> {
        self.hit();
        let mut st = self.state.lock().await;
        st.require_recipient(recipient_key)?;
        if let Some(inbox) = st.inboxes.get_mut(recipient_key) {
            for e in inbox.iter_mut() {
                e.unread = false;
            }
        }
        Ok(())
    }

    async fn subscribe(&self, recipient_key: &str, topic: &str) -> Result<()> {
        self.hit();
        let mut st = self.state.lock().await;
        st.require_recipient(recipient_key)?;
        st.subscriptions
            .entry(recipient_key.to_string())
            .or_default()
            .insert(topic.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, recipient_key: &str, topic: &str) -> Result<()> {
        self.hit();
        let mut st = self.state.lock().await;
        if let Some(topics) = st.subscriptions.get_mut(recipient_key) {
            topics.remove(topic);
        }
        Ok(())
    }
}

#[async_trait]
impl TriggerApi for MemoryAxilent {
    async fn trigger(&self, request: &TriggerRequest) -> Result<()> {
        self.hit();
        self.state.lock().await.triggers.push(request.clone());
        Ok(())
    }

    async fn profile(&self) -> Result<String> {
        self.hit();
        Ok(uuid::Uuid::new_v4().simple().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: serde_json::Value) -> Fields {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn content_is_keyed_by_slug() {
        let ax = MemoryAxilent::new();
        ax.put_content("Blog Post", "k1", fields(json!({"title": "x"})))
            .await;
        let img = ax.get_content("blog post", "k1").await.unwrap();
        assert_eq!(img.field("title"), Some(&json!("x")));
        assert_eq!(ax.content_keys("Blog Post!").await.unwrap(), vec!["k1"]);
        assert_eq!(ax.calls(), 2);
    }

    #[tokio::test]
    async fn publish_delivers_to_subscribers_only() {
        let ax = MemoryAxilent::new();
        let alice = ax.create_recipient("bus", "user", &Fields::new()).await.unwrap();
        let bob = ax.create_recipient("bus", "user", &Fields::new()).await.unwrap();
        ax.subscribe(&alice, "news").await.unwrap();
        let msg = ax
            .create_message("bus", "note", &bob, &Fields::new())
            .await
            .unwrap();

        ax.publish_message(&msg, "news").await.unwrap();

        assert_eq!(ax.inbox(&alice, true).await.unwrap().len(), 1);
        assert!(ax.inbox(&bob, true).await.unwrap().is_empty());
    }
}
