use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::field_map::{FieldKind, FieldMappingError, apply_inbound, build_outbound, parse_link};
use crate::models::{ContentRecord, Fields, LocalRef, LocalRow};
use crate::registry::{ContentBinding, ContentModel, Registry, model_fields};
use crate::remote::{ContentApi, ContentImage};
use crate::store::{LocalStore, SyncDb};
use crate::{Error, Result};

/// Result of a push: whether anything was written remotely and whether a new
/// remote item (and Content Record) was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushOutcome {
    pub written: bool,
    pub created: bool,
}

impl PushOutcome {
    pub const SKIPPED: PushOutcome = PushOutcome {
        written: false,
        created: false,
    };
    pub const UPDATED: PushOutcome = PushOutcome {
        written: true,
        created: false,
    };
    pub const CREATED: PushOutcome = PushOutcome {
        written: true,
        created: true,
    };
}

/// A local row after remote content was applied to it.
#[derive(Debug, Clone)]
pub struct Synced {
    pub row: LocalRow,
    pub record: ContentRecord,
    /// Fields that could not be applied; the row was saved without them.
    pub field_errors: Vec<FieldMappingError>,
}

/// Content Record reconciliation: binds local rows to remote content items.
pub struct ContentRecords {
    registry: Arc<Registry>,
    db: Arc<dyn SyncDb>,
    rows: Arc<dyn LocalStore>,
    content: Option<Arc<dyn ContentApi>>,
    push_locks: DashMap<LocalRef, Arc<Mutex<()>>>,
}

impl ContentRecords {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(registry: Arc<Registry>, db: Arc<dyn SyncDb>, rows: Arc<dyn LocalStore>) -> Self {
        Self {
            registry,
            db,
            rows,
            content: None,
            push_locks: DashMap::new(),
        }
    }

    /// Attach the remote content client. Without one, pushes are skipped and pulls fail
    /// with `Misconfigured`.
    pub fn with_content_api(mut self, content: Arc<dyn ContentApi>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn db(&self) -> &Arc<dyn SyncDb> {
        &self.db
    }

    pub fn rows(&self) -> &Arc<dyn LocalStore> {
        &self.rows
    }

    pub fn is_configured(&self) -> bool {
        self.content.is_some()
    }

    pub(crate) fn content_api(&self) -> Result<&Arc<dyn ContentApi>> {
        self.content
            .as_ref()
            .ok_or_else(|| Error::Misconfigured("no remote content client configured".to_string()))
    }

    /// Store a typed model as a new local row.
    pub async fn insert_model<T: ContentModel>(&self, model: &T) -> Result<LocalRow> {
        self.registry.require_local_type(T::LOCAL_TYPE)?;
        self.rows.insert_row(T::LOCAL_TYPE, &model_fields(model)?).await
    }

    pub async fn load_row(&self, local: &LocalRef) -> Result<LocalRow> {
        self.rows
            .get_row(local)
            .await?
            .ok_or_else(|| Error::NotFound(format!("local row {local}")))
    }

    /// The record for a local row; `NotFound` if the row was never synced.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_record(&self, local: &LocalRef) -> Result<ContentRecord> {
        self.find_record(local)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no content record for {local}")))
    }

    pub async fn find_record(&self, local: &LocalRef) -> Result<Option<ContentRecord>> {
        self.db.record_for_local(local).await
    }

    /// Pull a remote item that has no local counterpart yet into a new row.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn create_model(&self, remote_type: &str, remote_key: &str) -> Result<Synced> {
        let binding = self.registry.require_content_type(remote_type)?;
        if let Some(existing) = self.db.record_for_remote(remote_type, remote_key).await? {
            return Err(Error::Conflict(format!(
                "{} is already bound to {}",
                existing.link(),
                existing.local_ref()
            )));
        }

        let image = self.content_api()?.get_content(remote_type, remote_key).await?;

        let mut fields = binding.blank_row();
        let field_errors = self.apply_remote(binding, &image.data, &mut fields).await?;
        let row = self.rows.insert_row(binding.local_type(), &fields).await?;

        let record = ContentRecord::new(&row.local_ref(), remote_type, remote_key, Some(Utc::now()))?;
        if let Err(e) = self.db.insert_record(&record).await {
            // Keep the one-row-per-record invariant when the record cannot be stored.
            if let Err(cleanup) = self.rows.delete_row(&row.local_ref()).await {
                tracing::error!(local = %row.local_ref(), error = %cleanup, "orphaned local row");
            }
            return Err(e);
        }

        log_field_errors(&row.local_ref(), &field_errors);
        tracing::info!(local = %row.local_ref(), remote = %record.link(), "created local row from remote content");
        Ok(Synced {
            row,
            record,
            field_errors,
        })
    }

    /// Apply a remote payload onto the record's existing local row.
    #[tracing::instrument(level = "debug", skip(self, record, payload), fields(remote = %record.link()))]
    pub async fn sync_content(&self, record: ContentRecord, payload: &Fields) -> Result<Synced> {
        let mut record = record;
        let binding = self.registry.require_content_type(&record.remote_type)?;
        let mut row = self.load_row(&record.local_ref()).await?;

        let field_errors = self.apply_remote(binding, payload, &mut row.fields).await?;
        self.rows.save_row(&row).await?;

        record.touch(Utc::now());
        self.db.update_record(&record).await?;

        log_field_errors(&row.local_ref(), &field_errors);
        Ok(Synced {
            row,
            record,
            field_errors,
        })
    }

    /// Whether the remote item changed since the record was last synced.
    #[tracing::instrument(level = "debug", skip(self, record), fields(remote = %record.link()))]
    pub async fn update_available(&self, record: &ContentRecord) -> Result<bool> {
        let latest = self
            .content_api()?
            .latest_update(&record.remote_type, &record.remote_key)
            .await?;
        Ok(match (latest, record.last_synced_at) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(remote), Some(synced)) => remote > synced,
        })
    }

    pub async fn get_update(&self, record: &ContentRecord) -> Result<ContentImage> {
        self.content_api()?
            .get_content(&record.remote_type, &record.remote_key)
            .await
    }

    /// Pull remote changes for one local row. Returns whether the row changed.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn sync_model(&self, local: &LocalRef) -> Result<bool> {
        let record = self.get_record(local).await?;
        if !self.update_available(&record).await? {
            return Ok(false);
        }
        let image = self.get_update(&record).await?;
        self.sync_content(record, &image.data).await?;
        Ok(true)
    }

    /// Push a local row to the remote library, creating the remote item on first push.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn push_to_library(&self, local: &LocalRef) -> Result<PushOutcome> {
        let Some(api) = self.content.as_ref() else {
            tracing::debug!(local = %local, "no remote content client; push skipped");
            return Ok(PushOutcome::SKIPPED);
        };
        let binding = self.registry.require_local_type(&local.local_type)?;

        let lock = self
            .push_locks
            .entry(local.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let outcome = {
            let _guard = lock.lock().await;
            self.push_locked(api.as_ref(), binding, local).await
        };
        drop(lock);
        self.push_locks
            .remove_if(local, |_, l| Arc::strong_count(l) == 1);
        outcome
    }

    /// Same as `push_to_library`; kept for the graph-oriented entry point.
    pub async fn push_to_graphstack(&self, local: &LocalRef) -> Result<PushOutcome> {
        self.push_to_library(local).await
    }

    async fn push_locked(
        &self,
        api: &dyn ContentApi,
        binding: &ContentBinding,
        local: &LocalRef,
    ) -> Result<PushOutcome> {
        let row = self.load_row(local).await?;
        let payload = self.outbound(binding, &row).await?;

        match self.find_record(local).await? {
            Some(mut record) => {
                api.update_content(&record.remote_type, &record.remote_key, &payload)
                    .await?;
                record.touch(Utc::now());
                self.db.update_record(&record).await?;
                tracing::info!(local = %local, remote = %record.link(), "updated remote content");
                Ok(PushOutcome::UPDATED)
            }
            None => {
                let key = api.create_content(binding.content_type(), &payload).await?;
                let record =
                    ContentRecord::new(local, binding.content_type(), key, Some(Utc::now()))?;
                self.db.insert_record(&record).await?;
                tracing::info!(local = %local, remote = %record.link(), "created remote content");
                Ok(PushOutcome::CREATED)
            }
        }
    }

    /// Outgoing payload for a local row, as the remote library would receive it.
    pub async fn outbound_fields(&self, local: &LocalRef) -> Result<Fields> {
        let binding = self.registry.require_local_type(&local.local_type)?;
        let row = self.load_row(local).await?;
        self.outbound(binding, &row).await
    }

    async fn outbound(&self, binding: &ContentBinding, row: &LocalRow) -> Result<Fields> {
        let mut payload = build_outbound(binding, &row.fields)?;
        for mapping in binding.link_mappings() {
            let FieldKind::Link { content_type } = &mapping.kind else {
                continue;
            };
            let Some(id) = payload.get(&mapping.remote_field).and_then(Value::as_i64) else {
                continue;
            };
            let Some(target) = self.registry.by_content_type(content_type) else {
                continue;
            };
            if let Some(rec) = self
                .db
                .record_for_local(&LocalRef::new(target.local_type(), id))
                .await?
            {
                payload.insert(mapping.remote_field.clone(), Value::String(rec.link()));
            }
        }
        Ok(payload)
    }

    /// Resolve `"Type:key"` links to local ids, then apply the field map.
    async fn apply_remote(
        &self,
        binding: &ContentBinding,
        payload: &Fields,
        row: &mut Fields,
    ) -> Result<Vec<FieldMappingError>> {
        let mut payload = payload.clone();
        for mapping in binding.link_mappings() {
            let FieldKind::Link { content_type: target } = &mapping.kind else {
                continue;
            };
            let Some(value) = payload.get(&mapping.remote_field) else {
                continue;
            };
            let Some((content_type, key)) = parse_link(value) else {
                continue;
            };
            if content_type != target.as_str() {
                continue;
            }
            if let Some(rec) = self.db.record_for_remote(content_type, key).await? {
                payload.insert(mapping.remote_field.clone(), Value::from(rec.local_id));
            }
        }
        Ok(apply_inbound(binding, &payload, row))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn search(&self, query: &str, content_types: &[String]) -> Result<Vec<ContentImage>> {
        self.content_api()?.search(query, content_types).await
    }

    pub async fn get_by_unique_field(
        &self,
        content_type: &str,
        field_name: &str,
        field_value: &str,
    ) -> Result<ContentImage> {
        self.content_api()?
            .get_content_by_unique_field(content_type, field_name, field_value)
            .await
    }

    /// Delete the remote item and its Content Record. The local row is kept.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn delete_remote(&self, local: &LocalRef) -> Result<()> {
        let record = self.get_record(local).await?;
        self.content_api()?
            .delete_content(&record.remote_type, &record.remote_key)
            .await?;
        self.db.delete_record(record.id).await
    }

    pub async fn tag(&self, local: &LocalRef, tag: &str) -> Result<()> {
        let record = self.get_record(local).await?;
        self.content_api()?
            .tag_content(&record.remote_type, &record.remote_key, tag)
            .await
    }

    pub async fn detag(&self, local: &LocalRef, tag: &str) -> Result<()> {
        let record = self.get_record(local).await?;
        self.content_api()?
            .detag_content(&record.remote_type, &record.remote_key, tag)
            .await
    }

    pub async fn reindex(&self, local: &LocalRef) -> Result<()> {
        let record = self.get_record(local).await?;
        self.content_api()?
            .reindex_content(&record.remote_type, &record.remote_key)
            .await
    }
}

fn log_field_errors(local: &LocalRef, errors: &[FieldMappingError]) {
    for e in errors {
        tracing::warn!(local = %local, error = %e, "field not applied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Article, Harness};
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn create_model_yields_one_row_and_one_record() {
        let h = Harness::new().await;
        h.remote
            .put_content("Article", "a1", h.article_payload("Hello", "World"))
            .await;

        let synced = h.records.create_model("Article", "a1").await.unwrap();
        assert!(synced.field_errors.is_empty());
        assert_eq!(synced.row.fields.get("title"), Some(&json!("Hello")));
        assert_eq!(h.db.row_count(Article::LOCAL_TYPE).await, 1);

        let rec = h.records.get_record(&synced.row.local_ref()).await.unwrap();
        assert_eq!(rec.remote_key, "a1");
        assert!(rec.last_synced_at.is_some());

        let again = h.records.create_model("Article", "a1").await;
        assert!(matches!(again, Err(Error::Conflict(_))));
        assert_eq!(h.db.row_count(Article::LOCAL_TYPE).await, 1);
    }

    #[tokio::test]
    async fn create_model_unknown_type_is_not_found() {
        let h = Harness::new().await;
        let err = h.records.create_model("Gallery", "g1").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn get_record_for_unsynced_row_is_not_found() {
        let h = Harness::new().await;
        let row = h.records.insert_model(&Article::new("t", "b")).await.unwrap();
        assert!(h.records.get_record(&row.local_ref()).await.unwrap_err().is_not_found());
        assert!(h.records.find_record(&row.local_ref()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn push_outcomes_follow_record_presence() {
        let h = Harness::new().await;
        let row = h.records.insert_model(&Article::new("t", "b")).await.unwrap();
        let local = row.local_ref();

        assert_eq!(
            h.records.push_to_library(&local).await.unwrap(),
            PushOutcome::CREATED
        );
        assert_eq!(
            h.records.push_to_graphstack(&local).await.unwrap(),
            PushOutcome::UPDATED
        );

        let unconfigured = Harness::unconfigured().await;
        let row = unconfigured
            .records
            .insert_model(&Article::new("t", "b"))
            .await
            .unwrap();
        assert_eq!(
            unconfigured
                .records
                .push_to_library(&row.local_ref())
                .await
                .unwrap(),
            PushOutcome::SKIPPED
        );
    }

    #[tokio::test]
    async fn push_then_resync_preserves_fields() {
        let h = Harness::new().await;
        let mut article = Article::new("Round", "Trip");
        article.internal_note = "local only".to_string();
        let row = h.records.insert_model(&article).await.unwrap();
        let local = row.local_ref();
        h.records.push_to_library(&local).await.unwrap();

        let record = h.records.get_record(&local).await.unwrap();
        let remote = h.remote.content("Article", &record.remote_key).await.unwrap();
        assert!(!remote.contains_key("internal_note"));

        h.remote
            .set_latest_update(
                "Article",
                &record.remote_key,
                Some(Utc::now() + Duration::minutes(1)),
            )
            .await;
        assert!(h.records.sync_model(&local).await.unwrap());

        let after: Article = h.records.load_row(&local).await.unwrap().to_model().unwrap();
        assert_eq!(after, article);
    }

    #[tokio::test]
    async fn update_available_compares_strictly() {
        let h = Harness::new().await;
        h.remote
            .put_content("Article", "a1", h.article_payload("x", "y"))
            .await;
        let synced = h.records.create_model("Article", "a1").await.unwrap();
        let mut record = synced.record;
        let at = record.last_synced_at.unwrap();

        h.remote.set_latest_update("Article", "a1", Some(at)).await;
        assert!(!h.records.update_available(&record).await.unwrap());

        h.remote
            .set_latest_update("Article", "a1", Some(at + Duration::seconds(1)))
            .await;
        assert!(h.records.update_available(&record).await.unwrap());

        h.remote.set_latest_update("Article", "a1", None).await;
        assert!(!h.records.update_available(&record).await.unwrap());

        record.last_synced_at = None;
        h.remote.set_latest_update("Article", "a1", Some(at)).await;
        assert!(h.records.update_available(&record).await.unwrap());
    }

    #[tokio::test]
    async fn bad_field_is_skipped_and_row_still_saved() {
        let h = Harness::new().await;
        let mut payload = h.article_payload("Good", "Body");
        payload.insert("word_count".into(), json!("lots"));
        h.remote.put_content("Article", "a1", payload).await;

        let synced = h.records.create_model("Article", "a1").await.unwrap();
        assert_eq!(synced.field_errors.len(), 1);
        assert_eq!(synced.row.fields.get("title"), Some(&json!("Good")));
        assert_eq!(synced.row.fields.get("word_count"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn links_resolve_both_ways() {
        let h = Harness::new().await;
        h.remote
            .put_content("Author", "au1", json!({"name": "Ada"}).as_object().cloned().unwrap())
            .await;
        let author = h.records.create_model("Author", "au1").await.unwrap();

        let mut payload = h.article_payload("Linked", "Body");
        payload.insert("author".into(), json!("Author:au1"));
        h.remote.put_content("Article", "a1", payload).await;
        let article = h.records.create_model("Article", "a1").await.unwrap();
        assert_eq!(
            article.row.fields.get("author_id"),
            Some(&json!(author.row.local_id))
        );

        let out = h
            .records
            .outbound_fields(&article.row.local_ref())
            .await
            .unwrap();
        assert_eq!(out.get("author"), Some(&json!("Author:au1")));

        let mut payload = h.article_payload("Dangling", "Body");
        payload.insert("author".into(), json!("Author:nobody"));
        h.remote.put_content("Article", "a2", payload).await;
        let dangling = h.records.create_model("Article", "a2").await.unwrap();
        assert_eq!(dangling.field_errors.len(), 1);
    }

    #[tokio::test]
    async fn links_to_another_type_are_not_resolved() {
        let h = Harness::new().await;
        h.remote
            .put_content("Room", "r1", json!({"name": "Atrium"}).as_object().cloned().unwrap())
            .await;
        let room = h.records.create_model("Room", "r1").await.unwrap();

        let mut payload = h.article_payload("Misdirected", "Body");
        payload.insert("author".into(), json!("Room:r1"));
        h.remote.put_content("Article", "a1", payload).await;
        let article = h.records.create_model("Article", "a1").await.unwrap();
        assert_eq!(article.field_errors.len(), 1);
        assert_ne!(
            article.row.fields.get("author_id"),
            Some(&json!(room.row.local_id))
        );
    }

    #[tokio::test]
    async fn passthroughs_use_the_record() {
        let h = Harness::new().await;
        let row = h.records.insert_model(&Article::new("Tag", "me")).await.unwrap();
        let local = row.local_ref();
        h.records.push_to_library(&local).await.unwrap();
        let key = h.records.get_record(&local).await.unwrap().remote_key;

        h.records.tag(&local, "featured").await.unwrap();
        assert!(h.remote.tags("Article", &key).await.contains("featured"));
        h.records.detag(&local, "featured").await.unwrap();
        assert!(h.remote.tags("Article", &key).await.is_empty());

        h.records.reindex(&local).await.unwrap();
        assert_eq!(h.remote.reindexed().await.len(), 1);

        let hits = h.records.search("tag", &["Article".to_string()]).await.unwrap();
        assert_eq!(hits.len(), 1);

        h.records.delete_remote(&local).await.unwrap();
        assert!(h.records.find_record(&local).await.unwrap().is_none());
        assert!(h.remote.content("Article", &key).await.is_none());
        assert!(h.records.load_row(&local).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_pushes_of_one_row_create_once() {
        let h = Harness::new().await;
        let row = h.records.insert_model(&Article::new("t", "b")).await.unwrap();
        let local = row.local_ref();

        let (a, b) = tokio::join!(
            h.records.push_to_library(&local),
            h.records.push_to_library(&local)
        );
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|o| o.created);
        assert_eq!(outcomes, vec![PushOutcome::UPDATED, PushOutcome::CREATED]);
        assert!(h.records.push_locks.is_empty());
    }
}
