use crate::models::LocalRef;
use crate::remote::EventSchedule;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local calendar entry for a row; unique on the local ref.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub calendar: String,
    pub local_type: String,
    pub local_id: i64,
    pub schedule: EventSchedule,
}

impl CalendarEvent {
    pub fn new(calendar: impl Into<String>, local: &LocalRef, schedule: EventSchedule) -> Result<Self> {
        let calendar = calendar.into();
        if calendar.trim().is_empty() {
            return Err(Error::InvalidInput("calendar is empty".to_string()));
        }
        schedule.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            calendar,
            local_type: local.local_type.clone(),
            local_id: local.local_id,
            schedule,
        })
    }

    pub fn local_ref(&self) -> LocalRef {
        LocalRef::new(self.local_type.clone(), self.local_id)
    }
}

/// Remote resource profile (room, person, equipment) bound to a local row.
///
/// Unique on the local ref and on `resource_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarResource {
    pub id: Uuid,
    pub calendar: String,
    pub local_type: String,
    pub local_id: i64,
    pub resource_key: String,
}

impl CalendarResource {
    pub fn local_ref(&self) -> LocalRef {
        LocalRef::new(self.local_type.clone(), self.local_id)
    }
}
