use crate::server::AppState;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub uptime_secs: u64,
    /// False when no Axilent API key is configured.
    pub remote_configured: bool,
    pub content_types: Vec<String>,
}

#[tracing::instrument(level = "debug", skip_all)]
pub async fn get_health(Extension(state): Extension<Arc<AppState>>) -> Json<Health> {
    let records = state.records();
    Json(Health {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
        remote_configured: records.is_configured(),
        content_types: records.registry().content_types(),
    })
}
