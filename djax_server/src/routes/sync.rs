use crate::auth;
use crate::error::ApiError;
use crate::server::AppState;
use axum::body::Bytes;
use axum::extract::Query;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Extension, Json};
use djax_core::{ItemOutcome, SyncReport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct SyncParams {
    pub token: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub synced: bool,
    pub report: Option<SyncReport>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordParams {
    pub content_type: Option<String>,
    pub content_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub content_type: String,
    pub content_key: String,
    pub outcome: ItemOutcome,
}

#[tracing::instrument(level = "debug", skip_all)]
pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/djax/sync", post(post_sync))
        .route("/djax/sync-record", get(sync_record).post(sync_record))
}

/// Run a sync pass. Parameters may come from the JSON body or the query string;
/// the body wins.
#[tracing::instrument(level = "info", skip_all)]
pub async fn post_sync(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<SyncParams>,
    body: Bytes,
) -> Result<Json<SyncResponse>, ApiError> {
    let from_body: SyncParams = if body.iter().all(u8::is_ascii_whitespace) {
        SyncParams::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::InvalidInput(format!("invalid sync body: {e}")))?
    };
    let token = from_body.token.or(query.token);
    let content_type = from_body.content_type.or(query.content_type);

    let outcome = state
        .sync
        .sync_content(token, content_type.as_deref())
        .await?;
    Ok(Json(SyncResponse {
        synced: outcome.synced(),
        report: outcome.report().cloned(),
    }))
}

/// Reconcile one remote item. Requires a stored auth token.
#[tracing::instrument(level = "info", skip_all)]
pub async fn sync_record(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<RecordParams>,
) -> Result<Json<RecordResponse>, ApiError> {
    let token = auth::authenticate(state.db.as_ref(), &headers).await?;

    let content_type = required(params.content_type, "content_type")?;
    let content_key = required(params.content_key, "content_key")?;
    tracing::info!(token = %token.name, %content_type, %content_key, "single-record sync");

    let outcome = state.sync.sync_record(&content_type, &content_key).await?;
    Ok(Json(RecordResponse {
        content_type,
        content_key,
        outcome,
    }))
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::InvalidInput(format!("{name} is required")))
}
