use crate::models::Fields;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One content item as returned by the remote content API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentImage {
    pub content_type: String,
    pub key: String,
    pub data: Fields,
    /// Relevance score on policy/search results; 0 for plain fetches.
    #[serde(default)]
    pub endorsement: f64,
}

impl ContentImage {
    pub fn new(content_type: impl Into<String>, key: impl Into<String>, data: Fields) -> Self {
        Self {
            content_type: content_type.into(),
            key: key.into(),
            data,
            endorsement: 0.0,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceUnit {
    Day,
    Week,
    Month,
    Year,
}

impl RecurrenceUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceUnit::Day => "day",
            RecurrenceUnit::Week => "week",
            RecurrenceUnit::Month => "month",
            RecurrenceUnit::Year => "year",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(RecurrenceUnit::Day),
            "week" => Ok(RecurrenceUnit::Week),
            "month" => Ok(RecurrenceUnit::Month),
            "year" => Ok(RecurrenceUnit::Year),
            other => Err(Error::InvalidInput(format!("unknown recurrence unit '{other}'"))),
        }
    }
}

/// When a calendar event happens and how it repeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSchedule {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub recurrence_quantity: u32,
    #[serde(default)]
    pub recurrence_unit: Option<RecurrenceUnit>,
    #[serde(default)]
    pub recurrence_end: Option<DateTime<Utc>>,
}

impl EventSchedule {
    pub fn once(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        let schedule = Self {
            start,
            end,
            recurrence_quantity: 0,
            recurrence_unit: None,
            recurrence_end: None,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn validate(&self) -> Result<()> {
        if self.end < self.start {
            return Err(Error::InvalidInput("event ends before it starts".to_string()));
        }
        if self.recurrence_quantity > 0 && self.recurrence_unit.is_none() {
            return Err(Error::InvalidInput(
                "recurring event needs a recurrence unit".to_string(),
            ));
        }
        if let Some(until) = self.recurrence_end
            && until < self.start
        {
            return Err(Error::InvalidInput(
                "recurrence ends before the event starts".to_string(),
            ));
        }
        Ok(())
    }
}

/// An event occurrence reported by the remote calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEvent {
    pub event_key: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RemoteEvent {
    /// Half-open overlap with `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxEntry {
    pub message_key: String,
    #[serde(default = "default_unread")]
    pub unread: bool,
}

fn default_unread() -> bool {
    true
}

/// A behavioral event sent to the remote trigger API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub category: String,
    pub action: String,
    pub profile: Option<String>,
    pub variables: BTreeMap<String, String>,
}

impl TriggerRequest {
    pub fn new(category: impl Into<String>, action: impl Into<String>) -> Result<Self> {
        let category = category.into();
        let action = action.into();
        if category.trim().is_empty() {
            return Err(Error::InvalidInput("trigger category is empty".to_string()));
        }
        if action.trim().is_empty() {
            return Err(Error::InvalidInput("trigger action is empty".to_string()));
        }
        Ok(Self {
            category,
            action,
            profile: None,
            variables: BTreeMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn schedule_rejects_inverted_window() {
        let now = Utc::now();
        assert!(EventSchedule::once(now, now - Duration::hours(1)).is_err());
        assert!(EventSchedule::once(now, now + Duration::hours(1)).is_ok());
    }

    #[test]
    fn recurring_schedule_needs_unit() {
        let now = Utc::now();
        let mut s = EventSchedule::once(now, now + Duration::hours(1)).unwrap();
        s.recurrence_quantity = 2;
        assert!(s.validate().is_err());
        s.recurrence_unit = Some(RecurrenceUnit::Week);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn overlap_is_half_open() {
        let t0 = Utc::now();
        let ev = RemoteEvent {
            event_key: "e".into(),
            start: t0,
            end: t0 + Duration::hours(1),
        };
        assert!(ev.overlaps(t0 + Duration::minutes(30), t0 + Duration::hours(2)));
        assert!(!ev.overlaps(t0 + Duration::hours(1), t0 + Duration::hours(2)));
        assert!(!ev.overlaps(t0 - Duration::hours(1), t0));
    }
}
