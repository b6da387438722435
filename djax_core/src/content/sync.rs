use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::records::ContentRecords;
use crate::config::SyncConfig;
use crate::models::SyncLock;
use crate::remote::ContentApi;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub token: String,
    pub content_types: Vec<String>,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub failed: u64,
    /// Requested types that are not registered.
    pub skipped_types: Vec<String>,
    /// Individual fields that could not be applied across the pass.
    pub field_errors: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    fn new(token: &str) -> Self {
        let now = Utc::now();
        Self {
            token: token.to_string(),
            content_types: Vec::new(),
            created: 0,
            updated: 0,
            unchanged: 0,
            failed: 0,
            skipped_types: Vec::new(),
            field_errors: 0,
            started_at: now,
            finished_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Another pass holds the sync lock; nothing was done.
    Locked,
    Completed(SyncReport),
}

impl SyncOutcome {
    pub fn synced(&self) -> bool {
        matches!(self, SyncOutcome::Completed(_))
    }

    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            SyncOutcome::Locked => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Whole-registry sync orchestrator guarded by the single-row sync lock.
pub struct ContentSync {
    records: Arc<ContentRecords>,
    config: SyncConfig,
}

impl ContentSync {
    #[tracing::instrument(level = "debug", skip(records))]
    pub fn new(records: Arc<ContentRecords>, config: SyncConfig) -> Self {
        Self { records, config }
    }

    pub fn records(&self) -> &Arc<ContentRecords> {
        &self.records
    }

    /// Run one sync pass over every registered type, or only `content_type`.
    ///
    /// Returns `Locked` without touching anything when a pass is already running.
    #[tracing::instrument(level = "info", skip(self, token))]
    pub async fn sync_content(
        &self,
        token: Option<String>,
        content_type: Option<&str>,
    ) -> Result<SyncOutcome> {
        let api = self.records.content_api()?.clone();
        let db = self.records.db();
        let ttl = self.config.chrono_lock_ttl();

        if let Some(lock) = db.current_lock().await?
            && !lock.is_expired(ttl, Utc::now())
        {
            tracing::info!(acquired_at = %lock.acquired_at, "sync already in progress");
            return Ok(SyncOutcome::Locked);
        }

        let token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        if !db
            .try_acquire_lock(&SyncLock::new(token.clone(), Utc::now()), ttl)
            .await?
        {
            tracing::info!("lost the race for the sync lock");
            return Ok(SyncOutcome::Locked);
        }

        let pass = self.run_pass(api.as_ref(), &token, content_type).await;

        if let Err(e) = db.release_lock(&token).await {
            tracing::error!(error = %e, "failed to release sync lock; run `djax clear-locks`");
        }

        let report = pass?;
        tracing::info!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failed,
            "sync pass complete"
        );
        Ok(SyncOutcome::Completed(report))
    }

    async fn run_pass(
        &self,
        api: &dyn ContentApi,
        token: &str,
        content_type: Option<&str>,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::new(token);
        let registry = self.records.registry();

        report.content_types = match content_type {
            Some(ct) if registry.by_content_type(ct).is_some() => vec![ct.to_string()],
            Some(ct) => {
                tracing::warn!(content_type = %ct, "requested content type is not registered; skipping");
                report.skipped_types.push(ct.to_string());
                Vec::new()
            }
            None => registry.content_types(),
        };

        for ct in report.content_types.clone() {
            let keys = match api.content_keys(&ct).await {
                Ok(keys) => keys,
                Err(e) => {
                    tracing::warn!(content_type = %ct, error = %e, "failed to list remote keys");
                    report.failed += 1;
                    continue;
                }
            };

            for key in keys {
                match self.sync_item(&ct, &key).await {
                    Ok((outcome, field_errors)) => {
                        report.field_errors += field_errors;
                        match outcome {
                            ItemOutcome::Created => report.created += 1,
                            ItemOutcome::Updated => report.updated += 1,
                            ItemOutcome::Unchanged => report.unchanged += 1,
                        }
                    }
                    Err(e) if is_fatal(&e) => return Err(e),
                    Err(e) => {
                        tracing::warn!(content_type = %ct, key = %key, error = %e, "failed to sync item");
                        report.failed += 1;
                    }
                }
            }
        }

        report.finished_at = Utc::now();
        Ok(report)
    }

    /// Reconcile one named remote item without taking the sync lock.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn sync_record(&self, content_type: &str, content_key: &str) -> Result<ItemOutcome> {
        self.records.content_api()?;
        self.records.registry().require_content_type(content_type)?;
        let (outcome, _) = self.sync_item(content_type, content_key).await?;
        Ok(outcome)
    }

    async fn sync_item(&self, content_type: &str, key: &str) -> Result<(ItemOutcome, u64)> {
        let existing = self.records.db().record_for_remote(content_type, key).await?;
        match existing {
            Some(record) => {
                if !self.records.update_available(&record).await? {
                    return Ok((ItemOutcome::Unchanged, 0));
                }
                let image = self.records.get_update(&record).await?;
                let synced = self.records.sync_content(record, &image.data).await?;
                Ok((ItemOutcome::Updated, synced.field_errors.len() as u64))
            }
            None => {
                let synced = self.records.create_model(content_type, key).await?;
                Ok((ItemOutcome::Created, synced.field_errors.len() as u64))
            }
        }
    }

    /// Remove every sync lock row (administrative recovery after a crashed pass).
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn clear_locks(&self) -> Result<u64> {
        let cleared = self.records.db().clear_locks().await?;
        if cleared > 0 {
            tracing::warn!(cleared, "cleared sync locks");
        }
        Ok(cleared)
    }
}

/// Local storage failures abort the pass; remote and mapping failures only skip the item.
fn is_fatal(e: &Error) -> bool {
    matches!(e, Error::Backend { .. } | Error::BackendMessage(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fields, LocalRef, LocalRow};
    use crate::registry::ContentModel;
    use crate::remote::MemoryAxilent;
    use crate::store::{LocalStore, MemorySyncDb, RecordStore};
    use crate::test_support::{Article, Harness, registry};
    use async_trait::async_trait;
    use serde_json::json;

    #[tokio::test]
    async fn first_pass_creates_a_row_per_remote_key() {
        let h = Harness::new().await;
        h.remote
            .put_content("Article", "a1", h.article_payload("One", "1"))
            .await;
        h.remote
            .put_content("Article", "a2", h.article_payload("Two", "2"))
            .await;

        let outcome = h.sync().sync_content(None, None).await.unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(h.db.row_count(Article::LOCAL_TYPE).await, 2);

        let db = h.records.db();
        let r1 = db.record_for_remote("Article", "a1").await.unwrap().unwrap();
        let r2 = db.record_for_remote("Article", "a2").await.unwrap().unwrap();
        assert_ne!(r1.local_id, r2.local_id);
        assert!(db.current_lock().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_pass_leaves_unchanged_items_alone() {
        let h = Harness::new().await;
        h.remote
            .put_content("Article", "a1", h.article_payload("One", "1"))
            .await;
        let sync = h.sync();
        sync.sync_content(None, None).await.unwrap();

        let report = sync.sync_content(None, None).await.unwrap();
        let report = report.report().unwrap();
        assert_eq!((report.created, report.updated, report.unchanged), (0, 0, 1));

        h.remote
            .put_content("Article", "a1", h.article_payload("One!", "1"))
            .await;
        h.remote
            .set_latest_update(
                "Article",
                "a1",
                Some(Utc::now() + chrono::Duration::minutes(1)),
            )
            .await;
        let report = sync.sync_content(None, None).await.unwrap();
        assert_eq!(report.report().unwrap().updated, 1);
    }

    #[tokio::test]
    async fn held_lock_blocks_the_pass_without_remote_calls() {
        let h = Harness::new().await;
        h.remote
            .put_content("Article", "a1", h.article_payload("One", "1"))
            .await;
        h.records
            .db()
            .try_acquire_lock(&SyncLock::new("other", Utc::now()), None)
            .await
            .unwrap();

        let calls = h.remote.calls();
        let outcome = h.sync().sync_content(None, None).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Locked);
        assert!(!outcome.synced());
        assert_eq!(h.remote.calls(), calls);
        assert_eq!(h.db.row_count(Article::LOCAL_TYPE).await, 0);
        assert_eq!(
            h.records.db().current_lock().await.unwrap().unwrap().token,
            "other"
        );
    }

    #[tokio::test]
    async fn expired_lock_is_taken_over_with_ttl() {
        let h = Harness::new().await;
        h.records
            .db()
            .try_acquire_lock(
                &SyncLock::new("crashed", Utc::now() - chrono::Duration::hours(2)),
                None,
            )
            .await
            .unwrap();
        let sync = ContentSync::new(
            h.records.clone(),
            SyncConfig {
                lock_ttl: Some(std::time::Duration::from_secs(60)),
            },
        );
        assert!(sync.sync_content(None, None).await.unwrap().synced());
    }

    #[tokio::test]
    async fn empty_pass_releases_the_lock() {
        let h = Harness::new().await;
        let sync = h.sync();
        let outcome = sync
            .sync_content(Some("tok".to_string()), None)
            .await
            .unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.token, "tok");
        assert_eq!(report.created + report.updated + report.unchanged, 0);
        assert!(h.records.db().current_lock().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_requested_type_is_skipped_and_reported() {
        let h = Harness::new().await;
        let outcome = h.sync().sync_content(None, Some("Gallery")).await.unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.skipped_types, vec!["Gallery".to_string()]);
        assert!(report.content_types.is_empty());
    }

    #[tokio::test]
    async fn listing_failure_counts_and_moves_on() {
        let h = Harness::new().await;
        h.remote
            .put_content("Author", "au1", json!({"name": "Ada"}).as_object().cloned().unwrap())
            .await;
        h.remote.fail_content_type("Article").await;

        let outcome = h.sync().sync_content(None, None).await.unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.created, 1);
    }

    struct BrokenRows;

    #[async_trait]
    impl LocalStore for BrokenRows {
        async fn insert_row(&self, _local_type: &str, _fields: &Fields) -> Result<LocalRow> {
            Err(Error::BackendMessage("disk full".to_string()))
        }
        async fn get_row(&self, _local: &LocalRef) -> Result<Option<LocalRow>> {
            Ok(None)
        }
        async fn save_row(&self, _row: &LocalRow) -> Result<()> {
            Err(Error::BackendMessage("disk full".to_string()))
        }
        async fn list_rows(&self, _local_type: &str) -> Result<Vec<LocalRow>> {
            Ok(Vec::new())
        }
        async fn delete_row(&self, _local: &LocalRef) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn aborted_pass_still_releases_the_lock() {
        let db = MemorySyncDb::new();
        let remote = MemoryAxilent::new();
        remote
            .put_content("Article", "a1", json!({"title": "x"}).as_object().cloned().unwrap())
            .await;
        let records = ContentRecords::new(registry(), Arc::new(db.clone()), Arc::new(BrokenRows))
            .with_content_api(Arc::new(remote));
        let sync = ContentSync::new(Arc::new(records), SyncConfig::default());

        let err = sync.sync_content(None, Some("Article")).await.unwrap_err();
        assert!(matches!(err, Error::BackendMessage(_)));
        assert!(db.current_lock().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unconfigured_sync_is_misconfigured() {
        let h = Harness::unconfigured().await;
        let err = h.sync().sync_content(None, None).await.unwrap_err();
        assert!(matches!(err, Error::Misconfigured(_)));
        assert!(h.records.db().current_lock().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sync_record_ignores_the_lock() {
        let h = Harness::new().await;
        h.remote
            .put_content("Article", "a1", h.article_payload("One", "1"))
            .await;
        h.records
            .db()
            .try_acquire_lock(&SyncLock::new("other", Utc::now()), None)
            .await
            .unwrap();

        let sync = h.sync();
        assert_eq!(
            sync.sync_record("Article", "a1").await.unwrap(),
            ItemOutcome::Created
        );
        assert_eq!(
            sync.sync_record("Article", "a1").await.unwrap(),
            ItemOutcome::Unchanged
        );
        assert!(sync.sync_record("Gallery", "g1").await.unwrap_err().is_not_found());
        assert_eq!(sync.clear_locks().await.unwrap(), 1);
    }
}
