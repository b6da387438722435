use async_trait::async_trait;
use chrono::{DateTime, Utc};
use djax_core::Result;
use djax_core::models::Fields;
use djax_core::remote::{CalendarApi, EventSchedule, RemoteEvent};
use serde_json::json;
use tracing::instrument;

use super::AxilentClient;
use super::connection::App;
use super::wire;

#[async_trait]
impl CalendarApi for AxilentClient {
    #[instrument(level = "debug", skip(self, schedule, content))]
    async fn create_event(
        &self,
        calendar: &str,
        event_type: &str,
        schedule: &EventSchedule,
        content: &Fields,
    ) -> Result<String> {
        let body = json!({
            "calendar": calendar,
            "event_type": event_type,
            "schedule": wire::schedule(schedule),
            "content": content,
        });
        let resp = self.cx.call(App::Calendar, "createevent", body).await?;
        wire::key(resp, "content_key")
    }

    #[instrument(level = "debug", skip(self, schedule, content))]
    async fn update_event(
        &self,
        calendar: &str,
        event_key: &str,
        event_type: &str,
        schedule: &EventSchedule,
        content: &Fields,
    ) -> Result<()> {
        let body = json!({
            "calendar": calendar,
            "content_key": event_key,
            "event_type": event_type,
            "schedule": wire::schedule(schedule),
            "content": content,
        });
        self.cx.call(App::Calendar, "updateevent", body).await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete_event(&self, calendar: &str, event_key: &str) -> Result<()> {
        let body = json!({"calendar": calendar, "content_key": event_key});
        self.cx.call(App::Calendar, "deleteevent", body).await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self, attributes))]
    async fn create_resource(&self, calendar: &str, attributes: &Fields) -> Result<String> {
        let body = json!({"calendar": calendar, "attributes": attributes});
        let resp = self.cx.call(App::Calendar, "createresource", body).await?;
        wire::key(resp, "resource_key")
    }

    #[instrument(level = "debug", skip(self, attributes))]
    async fn update_resource(
        &self,
        calendar: &str,
        resource_key: &str,
        attributes: &Fields,
    ) -> Result<()> {
        let body = json!({
            "calendar": calendar,
            "resource_key": resource_key,
            "attributes": attributes,
        });
        self.cx.call(App::Calendar, "updateresource", body).await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn resource_events(
        &self,
        calendar: &str,
        resource_key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RemoteEvent>> {
        let body = json!({
            "calendar": calendar,
            "resource_key": resource_key,
            "start": start.to_rfc3339(),
            "end": end.to_rfc3339(),
        });
        wire::events(self.cx.call(App::Calendar, "resourceevents", body).await?)
    }
}
