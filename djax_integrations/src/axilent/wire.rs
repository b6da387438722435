//! Decoding of Axilent response bodies.
//!
//! A body that does not decode is reported as `Error::Remote`: the fault is on the
//! far side, and a sync pass keeps going past it.

use chrono::{DateTime, NaiveDateTime, Utc};
use djax_core::models::Fields;
use djax_core::remote::{ContentImage, EventSchedule, InboxEntry, RemoteEvent};
use djax_core::{Error, Result};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
struct RawContent {
    content_type: String,
    key: String,
    #[serde(default)]
    data: Fields,
}

fn malformed(what: &str, value: &Value) -> Error {
    Error::remote(None, format!("malformed axilent {what}: {value}"))
}

/// A content item, either bare or wrapped as `{"endorsement": n, "content": {...}}`.
pub fn content_image(value: Value) -> Result<ContentImage> {
    let (endorsement, content) = match value {
        Value::Object(mut obj) if obj.contains_key("endorsement") => {
            let endorsement = obj
                .get("endorsement")
                .and_then(Value::as_f64)
                .unwrap_or_default();
            let content = obj.remove("content").unwrap_or(Value::Null);
            (endorsement, content)
        }
        other => (0.0, other),
    };
    let raw: RawContent = serde_json::from_value(content.clone())
        .map_err(|_| malformed("content item", &content))?;
    let mut image = ContentImage::new(raw.content_type, raw.key, raw.data);
    image.endorsement = endorsement;
    Ok(image)
}

/// Search/channel results: a bare list or a policy result `{"default": [...]}`.
pub fn content_list(value: Value) -> Result<Vec<ContentImage>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("default") {
            Some(Value::Array(items)) => items,
            _ => return Err(malformed("result list", &Value::Object(obj))),
        },
        Value::Null => Vec::new(),
        other => return Err(malformed("result list", &other)),
    };
    items.into_iter().map(content_image).collect()
}

pub fn string_list(value: Value) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                other => Err(malformed("key", &other)),
            })
            .collect(),
        other => Err(malformed("key list", &other)),
    }
}

/// A created object's key: a bare string or `{"<field>": "..."}`.
pub fn key(value: Value, field: &str) -> Result<String> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(s),
        Value::Object(ref obj) => obj
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| malformed(field, &value)),
        other => Err(malformed(field, &other)),
    }
}

/// `{"updated": ts|null}`. Accepts RFC 3339 and naive `YYYY-MM-DD HH:MM:SS[.f]` (UTC).
pub fn latest_update(value: &Value) -> Result<Option<DateTime<Utc>>> {
    match value.get("updated") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => parse_timestamp(s).map(Some),
        Some(other) => Err(malformed("update timestamp", other)),
    }
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| Error::remote(None, format!("unparseable axilent timestamp: {s}")))
}

pub fn schedule(schedule: &EventSchedule) -> Value {
    json!({
        "start": schedule.start.to_rfc3339(),
        "end": schedule.end.to_rfc3339(),
        "recurrence_quantity": schedule.recurrence_quantity,
        "recurrence_unit": schedule.recurrence_unit.map(|u| u.as_str()),
        "recurrence_end": schedule.recurrence_end.map(|t| t.to_rfc3339()),
    })
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(alias = "key")]
    event_key: String,
    start: String,
    end: String,
}

pub fn events(value: Value) -> Result<Vec<RemoteEvent>> {
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => return Err(malformed("event list", &other)),
    };
    items
        .into_iter()
        .map(|item| {
            let raw: RawEvent =
                serde_json::from_value(item.clone()).map_err(|_| malformed("event", &item))?;
            Ok(RemoteEvent {
                event_key: raw.event_key,
                start: parse_timestamp(&raw.start)?,
                end: parse_timestamp(&raw.end)?,
            })
        })
        .collect()
}

pub fn inbox(value: Value) -> Result<Vec<InboxEntry>> {
    match value {
        Value::Null => Ok(Vec::new()),
        other => serde_json::from_value(other.clone()).map_err(|_| malformed("inbox", &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn content_image_unwraps_endorsement() {
        let bare = json!({"content_type": "article", "key": "a1", "data": {"title": "x"}});
        let image = content_image(bare.clone()).unwrap();
        assert_eq!(image.key, "a1");
        assert_eq!(image.endorsement, 0.0);
        assert_eq!(image.field("title"), Some(&json!("x")));

        let wrapped = json!({"endorsement": 2.5, "content": bare});
        let image = content_image(wrapped).unwrap();
        assert_eq!(image.endorsement, 2.5);
        assert_eq!(image.content_type, "article");

        assert!(content_image(json!({"key": "a1"})).is_err());
    }

    #[test]
    fn content_list_accepts_policy_results() {
        let item = json!({"content_type": "article", "key": "a1", "data": {}});
        assert_eq!(content_list(json!([item.clone()])).unwrap().len(), 1);
        let policy = json!({"default": [item.clone(), item], "meta": {"flavor": "x"}});
        assert_eq!(content_list(policy).unwrap().len(), 2);
        assert!(content_list(Value::Null).unwrap().is_empty());
        assert!(content_list(json!({"meta": {}})).is_err());
    }

    #[test]
    fn keys_come_bare_or_wrapped() {
        assert_eq!(key(json!("k1"), "content_key").unwrap(), "k1");
        assert_eq!(
            key(json!({"content_key": "k2"}), "content_key").unwrap(),
            "k2"
        );
        assert!(key(json!({"other": "k"}), "content_key").is_err());
        assert_eq!(string_list(json!(["a", "b"])).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn latest_update_parses_both_formats() {
        assert_eq!(latest_update(&json!({"updated": null})).unwrap(), None);
        assert_eq!(latest_update(&json!({})).unwrap(), None);

        let rfc = latest_update(&json!({"updated": "2024-03-01T12:30:00+02:00"}))
            .unwrap()
            .unwrap();
        assert_eq!(rfc, Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap());

        let naive = latest_update(&json!({"updated": "2024-03-01 12:30:00.250"}))
            .unwrap()
            .unwrap();
        assert_eq!((naive.month(), naive.hour()), (3, 12));

        assert!(latest_update(&json!({"updated": "yesterday"})).is_err());
    }

    #[test]
    fn events_decode_with_timestamps() {
        let events = events(json!([
            {"event_key": "e1", "start": "2024-01-01T09:00:00Z", "end": "2024-01-01T10:00:00Z"},
            {"key": "e2", "start": "2024-01-01 11:00:00", "end": "2024-01-01 12:00:00"}
        ]))
        .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_key, "e2");
        assert_eq!(events[1].start.hour(), 11);
    }

    #[test]
    fn inbox_defaults_to_unread() {
        let entries = inbox(json!([{"message_key": "m1"}, {"message_key": "m2", "unread": false}]))
            .unwrap();
        assert!(entries[0].unread);
        assert!(!entries[1].unread);
    }
}
