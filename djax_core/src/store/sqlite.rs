//! SQLite-backed store for the Djax tables and application rows.
//!
//! Single WAL-mode file. Timestamps are RFC 3339 TEXT with microseconds and a `Z`
//! suffix, so lexical comparison matches time order.
//!
//! Usage:
//! ```ignore
//! let db = SqliteSyncDb::new("/var/lib/djax/djax.db").await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use super::traits::{CalendarStore, LocalStore, MessagingStore, RecordStore, TokenStore};
use crate::calendar::models::{CalendarEvent, CalendarResource};
use crate::messaging::models::{Message, ReceivedMessage, Recipient};
use crate::models::{AuthToken, ContentRecord, Fields, LocalRef, LocalRow, SyncLock};
use crate::remote::{EventSchedule, RecurrenceUnit};
use crate::{Error, Result};

#[derive(Clone)]
pub struct SqliteSyncDb {
    pool: SqlitePool,
}

impl SqliteSyncDb {
    /// Create (or open) the store at `path`, creating parent directories and the schema.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::backend("sqlite_sync_db", e))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", path.display()))
            .map_err(|e| Error::backend("sqlite_sync_db", e))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(|e| Error::backend("sqlite_sync_db", e))?;

        Self::migrate(pool).await
    }

    /// Private in-memory database. One connection, so every query sees the same data.
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| Error::backend("sqlite_sync_db", e))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|e| Error::backend("sqlite_sync_db", e))?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| Error::backend("sqlite_sync_db_migration", e))?;
        Ok(Self { pool })
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS djax_local_sequences (
    local_type TEXT PRIMARY KEY,
    last_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS djax_local_rows (
    local_type TEXT NOT NULL,
    local_id INTEGER NOT NULL,
    fields TEXT NOT NULL,
    PRIMARY KEY (local_type, local_id)
);

CREATE TABLE IF NOT EXISTS djax_content_records (
    id TEXT PRIMARY KEY,
    local_type TEXT NOT NULL,
    local_id INTEGER NOT NULL,
    remote_type TEXT NOT NULL,
    remote_key TEXT NOT NULL,
    last_synced_at TEXT,
    UNIQUE (local_type, local_id),
    UNIQUE (remote_type, remote_key)
);

CREATE TABLE IF NOT EXISTS djax_sync_lock (
    slot INTEGER PRIMARY KEY CHECK (slot = 1),
    token TEXT NOT NULL,
    acquired_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS djax_calendar_events (
    id TEXT PRIMARY KEY,
    calendar TEXT NOT NULL,
    local_type TEXT NOT NULL,
    local_id INTEGER NOT NULL,
    start_at TEXT NOT NULL,
    end_at TEXT NOT NULL,
    recurrence_quantity INTEGER NOT NULL DEFAULT 0,
    recurrence_unit TEXT,
    recurrence_end TEXT,
    UNIQUE (local_type, local_id)
);

CREATE TABLE IF NOT EXISTS djax_calendar_resources (
    id TEXT PRIMARY KEY,
    calendar TEXT NOT NULL,
    local_type TEXT NOT NULL,
    local_id INTEGER NOT NULL,
    resource_key TEXT NOT NULL UNIQUE,
    UNIQUE (local_type, local_id)
);

CREATE TABLE IF NOT EXISTS djax_recipients (
    id TEXT PRIMARY KEY,
    local_type TEXT NOT NULL,
    local_id INTEGER NOT NULL,
    recipient_key TEXT NOT NULL UNIQUE,
    UNIQUE (local_type, local_id)
);

CREATE TABLE IF NOT EXISTS djax_messages (
    id TEXT PRIMARY KEY,
    local_type TEXT NOT NULL,
    local_id INTEGER NOT NULL,
    message_key TEXT NOT NULL UNIQUE,
    sender_key TEXT NOT NULL,
    UNIQUE (local_type, local_id)
);

CREATE TABLE IF NOT EXISTS djax_received_messages (
    id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    recipient_id TEXT NOT NULL,
    unread INTEGER NOT NULL DEFAULT 1,
    UNIQUE (message_id, recipient_id)
);

CREATE INDEX IF NOT EXISTS djax_received_recipient_idx ON djax_received_messages(recipient_id);

CREATE TABLE IF NOT EXISTS djax_auth_tokens (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    token_hash TEXT NOT NULL,
    origin_domain TEXT,
    created_at TEXT NOT NULL
);
"#;

fn db_err(e: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db) = &e
        && db.is_unique_violation()
    {
        return Error::Conflict(db.message().to_string());
    }
    Error::backend("sqlite_sync_db", e)
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::backend("parse datetime", e))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::backend("parse uuid", e))
}

fn parse_fields(s: &str) -> Result<Fields> {
    serde_json::from_str(s).map_err(|e| Error::backend("decode local row fields", e))
}

fn encode_fields(fields: &Fields) -> Result<String> {
    serde_json::to_string(fields).map_err(|e| Error::backend("encode local row fields", e))
}

fn record_from_row(r: &SqliteRow) -> Result<ContentRecord> {
    let id: String = r.get("id");
    let last_synced_at: Option<String> = r.get("last_synced_at");
    Ok(ContentRecord {
        id: parse_uuid(&id)?,
        local_type: r.get("local_type"),
        local_id: r.get("local_id"),
        remote_type: r.get("remote_type"),
        remote_key: r.get("remote_key"),
        last_synced_at: last_synced_at.as_deref().map(parse_dt).transpose()?,
    })
}

fn event_from_row(r: &SqliteRow) -> Result<CalendarEvent> {
    let id: String = r.get("id");
    let start: String = r.get("start_at");
    let end: String = r.get("end_at");
    let quantity: i64 = r.get("recurrence_quantity");
    let unit: Option<String> = r.get("recurrence_unit");
    let until: Option<String> = r.get("recurrence_end");
    Ok(CalendarEvent {
        id: parse_uuid(&id)?,
        calendar: r.get("calendar"),
        local_type: r.get("local_type"),
        local_id: r.get("local_id"),
        schedule: EventSchedule {
            start: parse_dt(&start)?,
            end: parse_dt(&end)?,
            recurrence_quantity: u32::try_from(quantity).unwrap_or(0),
            recurrence_unit: unit.as_deref().map(RecurrenceUnit::parse).transpose()?,
            recurrence_end: until.as_deref().map(parse_dt).transpose()?,
        },
    })
}

fn resource_from_row(r: &SqliteRow) -> Result<CalendarResource> {
    let id: String = r.get("id");
    Ok(CalendarResource {
        id: parse_uuid(&id)?,
        calendar: r.get("calendar"),
        local_type: r.get("local_type"),
        local_id: r.get("local_id"),
        resource_key: r.get("resource_key"),
    })
}

fn recipient_from_row(r: &SqliteRow) -> Result<Recipient> {
    let id: String = r.get("id");
    Ok(Recipient {
        id: parse_uuid(&id)?,
        local_type: r.get("local_type"),
        local_id: r.get("local_id"),
        recipient_key: r.get("recipient_key"),
    })
}

fn message_from_row(r: &SqliteRow) -> Result<Message> {
    let id: String = r.get("id");
    Ok(Message {
        id: parse_uuid(&id)?,
        local_type: r.get("local_type"),
        local_id: r.get("local_id"),
        message_key: r.get("message_key"),
        sender_key: r.get("sender_key"),
    })
}

fn received_from_row(r: &SqliteRow) -> Result<ReceivedMessage> {
    let id: String = r.get("id");
    let message_id: String = r.get("message_id");
    let recipient_id: String = r.get("recipient_id");
    let unread: i64 = r.get("unread");
    Ok(ReceivedMessage {
        id: parse_uuid(&id)?,
        message_id: parse_uuid(&message_id)?,
        recipient_id: parse_uuid(&recipient_id)?,
        unread: unread != 0,
    })
}

fn token_from_row(r: &SqliteRow) -> Result<AuthToken> {
    let id: String = r.get("id");
    let created_at: String = r.get("created_at");
    Ok(AuthToken {
        id: parse_uuid(&id)?,
        name: r.get("name"),
        token_hash: r.get("token_hash"),
        origin_domain: r.get("origin_domain"),
        created_at: parse_dt(&created_at)?,
    })
}

// ── LocalStore ─────────────────────────────────────────────────

#[async_trait]
impl LocalStore for SqliteSyncDb {
    async fn insert_row(&self, local_type: &str, fields: &Fields) -> Result<LocalRow> {
        if local_type.trim().is_empty() {
            return Err(Error::InvalidInput("local_type is empty".to_string()));
        }
        let encoded = encode_fields(fields)?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Ids come from a per-type sequence so deleted ids are never handed out again.
        let local_id: i64 = sqlx::query(
            "INSERT INTO djax_local_sequences (local_type, last_id)
             VALUES (?1, (SELECT COALESCE(MAX(local_id), 0) + 1 FROM djax_local_rows WHERE local_type = ?1))
             ON CONFLICT(local_type) DO UPDATE SET last_id = last_id + 1
             RETURNING last_id",
        )
        .bind(local_type)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?
        .get("last_id");

        sqlx::query("INSERT INTO djax_local_rows (local_type, local_id, fields) VALUES (?1, ?2, ?3)")
            .bind(local_type)
            .bind(local_id)
            .bind(encoded)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        Ok(LocalRow {
            local_type: local_type.to_string(),
            local_id,
            fields: fields.clone(),
        })
    }

    async fn get_row(&self, local: &LocalRef) -> Result<Option<LocalRow>> {
        let row = sqlx::query(
            "SELECT fields FROM djax_local_rows WHERE local_type = ?1 AND local_id = ?2",
        )
        .bind(&local.local_type)
        .bind(local.local_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|r| {
            let fields: String = r.get("fields");
            Ok(LocalRow {
                local_type: local.local_type.clone(),
                local_id: local.local_id,
                fields: parse_fields(&fields)?,
            })
        })
        .transpose()
    }

    async fn save_row(&self, row: &LocalRow) -> Result<()> {
        let res = sqlx::query(
            "UPDATE djax_local_rows SET fields = ?3 WHERE local_type = ?1 AND local_id = ?2",
        )
        .bind(&row.local_type)
        .bind(row.local_id)
        .bind(encode_fields(&row.fields)?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(Error::NotFound(format!("local row {}", row.local_ref())));
        }
        Ok(())
    }

    async fn list_rows(&self, local_type: &str) -> Result<Vec<LocalRow>> {
        let rows = sqlx::query(
            "SELECT local_id, fields FROM djax_local_rows WHERE local_type = ?1 ORDER BY local_id",
        )
        .bind(local_type)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|r| {
                let fields: String = r.get("fields");
                Ok(LocalRow {
                    local_type: local_type.to_string(),
                    local_id: r.get("local_id"),
                    fields: parse_fields(&fields)?,
                })
            })
            .collect()
    }

    async fn delete_row(&self, local: &LocalRef) -> Result<()> {
        sqlx::query("DELETE FROM djax_local_rows WHERE local_type = ?1 AND local_id = ?2")
            .bind(&local.local_type)
            .bind(local.local_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

// ── RecordStore ────────────────────────────────────────────────

#[async_trait]
impl RecordStore for SqliteSyncDb {
    async fn insert_record(&self, record: &ContentRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO djax_content_records
               (id, local_type, local_id, remote_type, remote_key, last_synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(record.id.to_string())
        .bind(&record.local_type)
        .bind(record.local_id)
        .bind(&record.remote_type)
        .bind(&record.remote_key)
        .bind(record.last_synced_at.as_ref().map(ts))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_record(&self, record: &ContentRecord) -> Result<()> {
        let res = sqlx::query(
            "UPDATE djax_content_records
             SET local_type = ?2, local_id = ?3, remote_type = ?4, remote_key = ?5, last_synced_at = ?6
             WHERE id = ?1",
        )
        .bind(record.id.to_string())
        .bind(&record.local_type)
        .bind(record.local_id)
        .bind(&record.remote_type)
        .bind(&record.remote_key)
        .bind(record.last_synced_at.as_ref().map(ts))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(Error::NotFound(format!("content record {}", record.id)));
        }
        Ok(())
    }

    async fn record_for_local(&self, local: &LocalRef) -> Result<Option<ContentRecord>> {
        let row = sqlx::query(
            "SELECT id, local_type, local_id, remote_type, remote_key, last_synced_at
             FROM djax_content_records WHERE local_type = ?1 AND local_id = ?2",
        )
        .bind(&local.local_type)
        .bind(local.local_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn record_for_remote(
        &self,
        remote_type: &str,
        remote_key: &str,
    ) -> Result<Option<ContentRecord>> {
        let row = sqlx::query(
            "SELECT id, local_type, local_id, remote_type, remote_key, last_synced_at
             FROM djax_content_records WHERE remote_type = ?1 AND remote_key = ?2",
        )
        .bind(remote_type)
        .bind(remote_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn delete_record(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM djax_content_records WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_records(&self, remote_type: Option<&str>) -> Result<Vec<ContentRecord>> {
        let rows = sqlx::query(
            "SELECT id, local_type, local_id, remote_type, remote_key, last_synced_at
             FROM djax_content_records
             WHERE ?1 IS NULL OR remote_type = ?1
             ORDER BY remote_type, remote_key",
        )
        .bind(remote_type)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(record_from_row).collect()
    }

    async fn try_acquire_lock(
        &self,
        lock: &SyncLock,
        ttl: Option<chrono::Duration>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if let Some(cutoff) = ttl.and_then(|ttl| Utc::now().checked_sub_signed(ttl)) {
            let cutoff = ts(&cutoff);
            let expired = sqlx::query("DELETE FROM djax_sync_lock WHERE acquired_at <= ?1")
                .bind(cutoff)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            if expired.rows_affected() > 0 {
                tracing::warn!(token = %lock.token, "replacing expired sync lock");
            }
        }

        let inserted = sqlx::query(
            "INSERT INTO djax_sync_lock (slot, token, acquired_at) VALUES (1, ?1, ?2)
             ON CONFLICT(slot) DO NOTHING",
        )
        .bind(&lock.token)
        .bind(ts(&lock.acquired_at))
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(inserted.rows_affected() == 1)
    }

    async fn current_lock(&self) -> Result<Option<SyncLock>> {
        let row = sqlx::query("SELECT token, acquired_at FROM djax_sync_lock WHERE slot = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| {
            let acquired_at: String = r.get("acquired_at");
            Ok(SyncLock {
                token: r.get("token"),
                acquired_at: parse_dt(&acquired_at)?,
            })
        })
        .transpose()
    }

    async fn release_lock(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM djax_sync_lock WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn clear_locks(&self) -> Result<u64> {
        let res = sqlx::query("DELETE FROM djax_sync_lock")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected())
    }
}

// ── CalendarStore ──────────────────────────────────────────────

#[async_trait]
impl CalendarStore for SqliteSyncDb {
    async fn upsert_calendar_event(&self, event: &CalendarEvent) -> Result<()> {
        let s = &event.schedule;
        sqlx::query(
            "INSERT INTO djax_calendar_events
               (id, calendar, local_type, local_id, start_at, end_at,
                recurrence_quantity, recurrence_unit, recurrence_end)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(local_type, local_id) DO UPDATE SET
               calendar = excluded.calendar,
               start_at = excluded.start_at,
               end_at = excluded.end_at,
               recurrence_quantity = excluded.recurrence_quantity,
               recurrence_unit = excluded.recurrence_unit,
               recurrence_end = excluded.recurrence_end",
        )
        .bind(event.id.to_string())
        .bind(&event.calendar)
        .bind(&event.local_type)
        .bind(event.local_id)
        .bind(ts(&s.start))
        .bind(ts(&s.end))
        .bind(i64::from(s.recurrence_quantity))
        .bind(s.recurrence_unit.map(|u| u.as_str()))
        .bind(s.recurrence_end.as_ref().map(ts))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn calendar_event_for_local(&self, local: &LocalRef) -> Result<Option<CalendarEvent>> {
        let row = sqlx::query(
            "SELECT id, calendar, local_type, local_id, start_at, end_at,
                    recurrence_quantity, recurrence_unit, recurrence_end
             FROM djax_calendar_events WHERE local_type = ?1 AND local_id = ?2",
        )
        .bind(&local.local_type)
        .bind(local.local_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(event_from_row).transpose()
    }

    async fn delete_calendar_event(&self, local: &LocalRef) -> Result<()> {
        sqlx::query("DELETE FROM djax_calendar_events WHERE local_type = ?1 AND local_id = ?2")
            .bind(&local.local_type)
            .bind(local.local_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_calendar_resource(&self, resource: &CalendarResource) -> Result<()> {
        sqlx::query(
            "INSERT INTO djax_calendar_resources (id, calendar, local_type, local_id, resource_key)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(local_type, local_id) DO UPDATE SET
               calendar = excluded.calendar,
               resource_key = excluded.resource_key",
        )
        .bind(resource.id.to_string())
        .bind(&resource.calendar)
        .bind(&resource.local_type)
        .bind(resource.local_id)
        .bind(&resource.resource_key)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn calendar_resource_for_local(
        &self,
        local: &LocalRef,
    ) -> Result<Option<CalendarResource>> {
        let row = sqlx::query(
            "SELECT id, calendar, local_type, local_id, resource_key
             FROM djax_calendar_resources WHERE local_type = ?1 AND local_id = ?2",
        )
        .bind(&local.local_type)
        .bind(local.local_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(resource_from_row).transpose()
    }

    async fn delete_calendar_resource(&self, local: &LocalRef) -> Result<()> {
        sqlx::query("DELETE FROM djax_calendar_resources WHERE local_type = ?1 AND local_id = ?2")
            .bind(&local.local_type)
            .bind(local.local_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

// ── MessagingStore ─────────────────────────────────────────────

#[async_trait]
impl MessagingStore for SqliteSyncDb {
    async fn insert_recipient(&self, recipient: &Recipient) -> Result<()> {
        sqlx::query(
            "INSERT INTO djax_recipients (id, local_type, local_id, recipient_key)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(recipient.id.to_string())
        .bind(&recipient.local_type)
        .bind(recipient.local_id)
        .bind(&recipient.recipient_key)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn recipient_for_local(&self, local: &LocalRef) -> Result<Option<Recipient>> {
        let row = sqlx::query(
            "SELECT id, local_type, local_id, recipient_key
             FROM djax_recipients WHERE local_type = ?1 AND local_id = ?2",
        )
        .bind(&local.local_type)
        .bind(local.local_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(recipient_from_row).transpose()
    }

    async fn recipient_by_key(&self, recipient_key: &str) -> Result<Option<Recipient>> {
        let row = sqlx::query(
            "SELECT id, local_type, local_id, recipient_key
             FROM djax_recipients WHERE recipient_key = ?1",
        )
        .bind(recipient_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(recipient_from_row).transpose()
    }

    async fn delete_recipient(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM djax_received_messages WHERE recipient_id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM djax_recipients WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> Result<()> {
        sqlx::query(
            "INSERT INTO djax_messages (id, local_type, local_id, message_key, sender_key)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(message.id.to_string())
        .bind(&message.local_type)
        .bind(message.local_id)
        .bind(&message.message_key)
        .bind(&message.sender_key)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn message_for_local(&self, local: &LocalRef) -> Result<Option<Message>> {
        let row = sqlx::query(
            "SELECT id, local_type, local_id, message_key, sender_key
             FROM djax_messages WHERE local_type = ?1 AND local_id = ?2",
        )
        .bind(&local.local_type)
        .bind(local.local_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn message_by_key(&self, message_key: &str) -> Result<Option<Message>> {
        let row = sqlx::query(
            "SELECT id, local_type, local_id, message_key, sender_key
             FROM djax_messages WHERE message_key = ?1",
        )
        .bind(message_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn delete_message(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM djax_received_messages WHERE message_id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM djax_messages WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn ensure_received(
        &self,
        message_id: Uuid,
        recipient_id: Uuid,
        unread: bool,
    ) -> Result<ReceivedMessage> {
        let row = sqlx::query(
            "INSERT INTO djax_received_messages (id, message_id, recipient_id, unread)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(message_id, recipient_id) DO UPDATE SET unread = excluded.unread
             RETURNING id, message_id, recipient_id, unread",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(message_id.to_string())
        .bind(recipient_id.to_string())
        .bind(i64::from(unread))
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        received_from_row(&row)
    }

    async fn received_for_recipient(&self, recipient_id: Uuid) -> Result<Vec<ReceivedMessage>> {
        let rows = sqlx::query(
            "SELECT id, message_id, recipient_id, unread
             FROM djax_received_messages WHERE recipient_id = ?1 ORDER BY rowid",
        )
        .bind(recipient_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(received_from_row).collect()
    }

    async fn update_received(&self, received: &ReceivedMessage) -> Result<()> {
        let res = sqlx::query("UPDATE djax_received_messages SET unread = ?2 WHERE id = ?1")
            .bind(received.id.to_string())
            .bind(i64::from(received.unread))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(Error::NotFound(format!("received message {}", received.id)));
        }
        Ok(())
    }

    async fn delete_received(&self, message_id: Uuid, recipient_id: Uuid) -> Result<()> {
        sqlx::query(
            "DELETE FROM djax_received_messages WHERE message_id = ?1 AND recipient_id = ?2",
        )
        .bind(message_id.to_string())
        .bind(recipient_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

// ── TokenStore ─────────────────────────────────────────────────

#[async_trait]
impl TokenStore for SqliteSyncDb {
    async fn insert_auth_token(&self, token: &AuthToken) -> Result<()> {
        sqlx::query(
            "INSERT INTO djax_auth_tokens (id, name, token_hash, origin_domain, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(token.id.to_string())
        .bind(&token.name)
        .bind(&token.token_hash)
        .bind(&token.origin_domain)
        .bind(ts(&token.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn auth_token_by_id(&self, id: Uuid) -> Result<Option<AuthToken>> {
        let row = sqlx::query(
            "SELECT id, name, token_hash, origin_domain, created_at
             FROM djax_auth_tokens WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(token_from_row).transpose()
    }

    async fn list_auth_tokens(&self) -> Result<Vec<AuthToken>> {
        let rows = sqlx::query(
            "SELECT id, name, token_hash, origin_domain, created_at
             FROM djax_auth_tokens ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(token_from_row).collect()
    }

    async fn delete_auth_token(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM djax_auth_tokens WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
