use async_trait::async_trait;
use djax_core::remote::{TriggerApi, TriggerRequest};
use djax_core::{Error, Result};
use serde_json::{Value, json};
use tracing::instrument;

use super::AxilentClient;
use super::connection::App;

#[async_trait]
impl TriggerApi for AxilentClient {
    #[instrument(level = "debug", skip(self, request), fields(category = %request.category, action = %request.action))]
    async fn trigger(&self, request: &TriggerRequest) -> Result<()> {
        let body = json!({
            "category": request.category,
            "action": request.action,
            "profile": request.profile,
            "variables": request.variables,
            "environment": {},
            "identity": {},
        });
        self.cx.call(App::Triggers, "trigger", body).await?;
        Ok(())
    }

    async fn profile(&self) -> Result<String> {
        match self.cx.call(App::Triggers, "profile", json!({})).await? {
            Value::String(profile) if !profile.is_empty() => Ok(profile),
            Value::Object(obj) => obj
                .get("profile")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::remote(None, "axilent profile response has no profile")),
            other => Err(Error::remote(
                None,
                format!("unexpected axilent profile response: {other}"),
            )),
        }
    }
}
