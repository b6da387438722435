//! Wiring of the SQLite store, registry and Axilent client into `AppState`.

use crate::models;
use crate::server::AppState;
use djax_core::store::SqliteSyncDb;
use djax_core::{AxilentConfig, ContentRecords, ContentSync, Result, SyncConfig};
use djax_integrations::AxilentClient;
use std::path::Path;
use std::sync::Arc;

#[tracing::instrument(level = "info", skip(axilent, sync))]
pub async fn build_state(
    database: &Path,
    axilent: &AxilentConfig,
    sync: SyncConfig,
) -> Result<AppState> {
    let db = Arc::new(SqliteSyncDb::new(database).await?);
    let registry = Arc::new(models::registry()?);

    let mut records = ContentRecords::new(registry, db.clone(), db);
    match AxilentClient::from_config(axilent)? {
        Some(client) => records = records.with_content_api(Arc::new(client)),
        None => tracing::warn!("running without a remote; sync endpoints will report misconfigured"),
    }

    let sync = ContentSync::new(Arc::new(records), sync);
    Ok(AppState::new(Arc::new(sync)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_unconfigured_state_on_fresh_database() {
        let dir = std::env::temp_dir().join(format!("djax-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let state = build_state(
            &dir.join("djax.db"),
            &AxilentConfig::default(),
            SyncConfig::default(),
        )
        .await
        .unwrap();
        assert!(!state.records().is_configured());
        assert_eq!(state.records().registry().content_types(), vec!["Article"]);

        let err = state.sync.sync_content(None, None).await.unwrap_err();
        assert!(matches!(err, djax_core::Error::Misconfigured(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
