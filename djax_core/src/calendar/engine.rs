use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::{CalendarEvent, CalendarResource};
use crate::content::{ContentRecords, PushOutcome};
use crate::models::{ContentRecord, LocalRef};
use crate::registry::{CalendarDescriptor, ContentBinding};
use crate::remote::{CalendarApi, EventSchedule};
use crate::{Error, Result};

/// Pushes local rows to the remote calendar as events or bookable resources.
///
/// An event shares its Content Record with the row: the remote event key is the
/// content key.
pub struct CalendarSync {
    records: Arc<ContentRecords>,
    api: Arc<dyn CalendarApi>,
}

impl CalendarSync {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(records: Arc<ContentRecords>, api: Arc<dyn CalendarApi>) -> Self {
        Self { records, api }
    }

    fn calendar_of<'a>(&self, binding: &'a ContentBinding) -> Result<&'a CalendarDescriptor> {
        binding.descriptor().calendar.as_ref().ok_or_else(|| {
            Error::Misconfigured(format!(
                "{} does not declare a calendar",
                binding.local_type()
            ))
        })
    }

    pub async fn event_for(&self, local: &LocalRef) -> Result<Option<CalendarEvent>> {
        self.records.db().calendar_event_for_local(local).await
    }

    /// Upsert the local event for `local`, then create or update it remotely.
    #[tracing::instrument(level = "info", skip(self, schedule))]
    pub async fn push_event(&self, local: &LocalRef, schedule: EventSchedule) -> Result<PushOutcome> {
        let binding = self.records.registry().require_local_type(&local.local_type)?;
        let calendar = self.calendar_of(binding)?;
        let event_type = calendar.event_type.as_deref().ok_or_else(|| {
            Error::Misconfigured(format!(
                "{} must set a calendar event type",
                binding.local_type()
            ))
        })?;
        schedule.validate()?;

        let content = self.records.outbound_fields(local).await?;
        let db = self.records.db();

        let event = match db.calendar_event_for_local(local).await? {
            Some(mut event) => {
                event.calendar = calendar.calendar.clone();
                event.schedule = schedule;
                event
            }
            None => CalendarEvent::new(calendar.calendar.clone(), local, schedule)?,
        };
        db.upsert_calendar_event(&event).await?;

        match self.records.find_record(local).await? {
            Some(mut record) => {
                self.api
                    .update_event(
                        &event.calendar,
                        &record.remote_key,
                        event_type,
                        &event.schedule,
                        &content,
                    )
                    .await?;
                record.touch(Utc::now());
                db.update_record(&record).await?;
                Ok(PushOutcome::UPDATED)
            }
            None => {
                let key = self
                    .api
                    .create_event(&event.calendar, event_type, &event.schedule, &content)
                    .await?;
                let record =
                    ContentRecord::new(local, binding.content_type(), key, Some(Utc::now()))?;
                db.insert_record(&record).await?;
                tracing::info!(local = %local, remote = %record.link(), "created calendar event");
                Ok(PushOutcome::CREATED)
            }
        }
    }

    /// Remove the remote event, then the local event and its Content Record.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn delete_event(&self, local: &LocalRef) -> Result<()> {
        let db = self.records.db();
        let event = db
            .calendar_event_for_local(local)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no calendar event for {local}")))?;
        let record = self.records.get_record(local).await?;

        self.api
            .delete_event(&event.calendar, &record.remote_key)
            .await?;
        db.delete_calendar_event(local).await?;
        db.delete_record(record.id).await
    }

    /// Create or update the resource profile for `local`.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn push_resource(&self, local: &LocalRef) -> Result<CalendarResource> {
        let binding = self.records.registry().require_local_type(&local.local_type)?;
        let calendar = self.calendar_of(binding)?;
        let attributes = self.records.outbound_fields(local).await?;
        let db = self.records.db();

        let resource = match db.calendar_resource_for_local(local).await? {
            Some(mut resource) => {
                resource.calendar = calendar.calendar.clone();
                self.api
                    .update_resource(&resource.calendar, &resource.resource_key, &attributes)
                    .await?;
                resource
            }
            None => {
                let resource_key = self
                    .api
                    .create_resource(&calendar.calendar, &attributes)
                    .await?;
                CalendarResource {
                    id: Uuid::new_v4(),
                    calendar: calendar.calendar.clone(),
                    local_type: local.local_type.clone(),
                    local_id: local.local_id,
                    resource_key,
                }
            }
        };
        db.upsert_calendar_resource(&resource).await?;
        Ok(resource)
    }

    /// True when the resource has no events overlapping `[start, end)`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn is_available(
        &self,
        local: &LocalRef,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool> {
        if end <= start {
            return Err(Error::InvalidInput(
                "availability window must end after it starts".to_string(),
            ));
        }
        let resource = self
            .records
            .db()
            .calendar_resource_for_local(local)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{local} is not a calendar resource")))?;

        let events = self
            .api
            .resource_events(&resource.calendar, &resource.resource_key, start, end)
            .await?;
        Ok(!events.iter().any(|e| e.overlaps(start, end)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{RecurrenceUnit, RemoteEvent};
    use crate::test_support::{Article, Harness, Meeting, Room};
    use chrono::Duration;
    use serde_json::json;

    fn calendar(h: &Harness) -> CalendarSync {
        CalendarSync::new(h.records.clone(), Arc::new(h.remote.clone()))
    }

    #[tokio::test]
    async fn push_event_creates_then_updates() {
        let h = Harness::new().await;
        let cal = calendar(&h);
        let row = h
            .records
            .insert_model(&Meeting {
                subject: "Standup".into(),
            })
            .await
            .unwrap();
        let local = row.local_ref();
        let start = Utc::now();

        let first = cal
            .push_event(&local, EventSchedule::once(start, start + Duration::minutes(15)).unwrap())
            .await
            .unwrap();
        assert_eq!(first, PushOutcome::CREATED);

        let key = h.records.get_record(&local).await.unwrap().remote_key;
        let (calendar_name, _, content) = h.remote.event(&key).await.unwrap();
        assert_eq!(calendar_name, "office");
        assert_eq!(content.get("subject"), Some(&json!("Standup")));
        assert_eq!(h.remote.event_type(&key).await.as_deref(), Some("meeting"));

        let mut weekly = EventSchedule::once(start, start + Duration::minutes(30)).unwrap();
        weekly.recurrence_quantity = 1;
        weekly.recurrence_unit = Some(RecurrenceUnit::Week);
        let second = cal.push_event(&local, weekly.clone()).await.unwrap();
        assert_eq!(second, PushOutcome::UPDATED);
        assert_eq!(h.remote.event(&key).await.unwrap().1, weekly);
        assert_eq!(cal.event_for(&local).await.unwrap().unwrap().schedule, weekly);
    }

    #[tokio::test]
    async fn event_type_is_required() {
        let h = Harness::new().await;
        let cal = calendar(&h);
        let room = h
            .records
            .insert_model(&Room { name: "A".into() })
            .await
            .unwrap();
        let start = Utc::now();
        let err = cal
            .push_event(
                &room.local_ref(),
                EventSchedule::once(start, start + Duration::hours(1)).unwrap(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Misconfigured(_)));

        let article = h.records.insert_model(&Article::new("t", "b")).await.unwrap();
        let err = cal.push_resource(&article.local_ref()).await.unwrap_err();
        assert!(matches!(err, Error::Misconfigured(_)));
    }

    #[tokio::test]
    async fn delete_event_removes_local_state() {
        let h = Harness::new().await;
        let cal = calendar(&h);
        let row = h
            .records
            .insert_model(&Meeting {
                subject: "Retro".into(),
            })
            .await
            .unwrap();
        let local = row.local_ref();
        let start = Utc::now();
        cal.push_event(&local, EventSchedule::once(start, start + Duration::hours(1)).unwrap())
            .await
            .unwrap();
        let key = h.records.get_record(&local).await.unwrap().remote_key;

        cal.delete_event(&local).await.unwrap();

        assert!(h.remote.event(&key).await.is_none());
        assert!(cal.event_for(&local).await.unwrap().is_none());
        assert!(h.records.find_record(&local).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn availability_follows_overlapping_events() {
        let h = Harness::new().await;
        let cal = calendar(&h);
        let room = h
            .records
            .insert_model(&Room {
                name: "Board room".into(),
            })
            .await
            .unwrap();
        let local = room.local_ref();
        let resource = cal.push_resource(&local).await.unwrap();
        assert_eq!(
            h.remote.resource(&resource.resource_key).await.unwrap().get("name"),
            Some(&json!("Board room"))
        );

        let t0 = Utc::now();
        assert!(cal.is_available(&local, t0, t0 + Duration::hours(1)).await.unwrap());

        h.remote
            .add_resource_event(
                &resource.resource_key,
                RemoteEvent {
                    event_key: "booked".into(),
                    start: t0 + Duration::minutes(30),
                    end: t0 + Duration::minutes(90),
                },
            )
            .await;
        assert!(!cal.is_available(&local, t0, t0 + Duration::hours(1)).await.unwrap());
        assert!(
            cal.is_available(&local, t0 + Duration::hours(2), t0 + Duration::hours(3))
                .await
                .unwrap()
        );

        let again = cal.push_resource(&local).await.unwrap();
        assert_eq!(again.resource_key, resource.resource_key);
    }

    #[tokio::test]
    async fn availability_needs_a_pushed_resource() {
        let h = Harness::new().await;
        let cal = calendar(&h);
        let room = h
            .records
            .insert_model(&Room { name: "B".into() })
            .await
            .unwrap();
        let t0 = Utc::now();
        let err = cal
            .is_available(&room.local_ref(), t0, t0 + Duration::hours(1))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
