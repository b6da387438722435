//! Authenticated JSON-over-HTTP transport to the Axilent API.

use djax_core::config::AxilentConfig;
use djax_core::{Error, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::instrument;

/// One remote API family, e.g. `axilent.content`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum App {
    Content,
    Calendar,
    Messaging,
    Triggers,
}

impl App {
    pub fn as_str(&self) -> &'static str {
        match self {
            App::Content => "content",
            App::Calendar => "calendar",
            App::Messaging => "messaging",
            App::Triggers => "triggers",
        }
    }
}

#[derive(Clone)]
pub struct AxilentConnection {
    client: Client,
    endpoint: String,
    api_version: String,
    api_key: String,
}

impl std::fmt::Debug for AxilentConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AxilentConnection")
            .field("endpoint", &self.endpoint)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl AxilentConnection {
    /// Build a connection from config. Fails when no API key is set.
    #[instrument(level = "debug", skip(config))]
    pub fn new(config: &AxilentConfig) -> Result<Self> {
        config.validate()?;
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Misconfigured("AXILENT_API_KEY is not set".to_string()))?
            .to_string();
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(Error::backend_reqwest)?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim().trim_end_matches('/').to_string(),
            api_version: config.api_version.trim().to_string(),
            api_key,
        })
    }

    pub fn url(&self, app: App, function: &str) -> String {
        format!(
            "{}/api/{}/axilent/{}/{}/",
            self.endpoint,
            self.api_version,
            app.as_str(),
            function
        )
    }

    /// POST `body` to `app/function` and return the decoded JSON response.
    ///
    /// An empty response body decodes to `Value::Null`.
    #[instrument(level = "debug", skip(self, body), fields(app = app.as_str()))]
    pub async fn call(&self, app: App, function: &str, body: Value) -> Result<Value> {
        let resp = self
            .client
            .post(self.url(app, function))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::remote(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::remote(Some(status.as_u16()), e.to_string()))?;
        if !status.is_success() {
            tracing::warn!(%status, function, "axilent call failed");
            return Err(status_error(status, function, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            Error::remote(Some(status.as_u16()), format!("{function}: undecodable body: {e}"))
        })
    }
}

pub(crate) fn status_error(status: StatusCode, function: &str, body: &str) -> Error {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{status}: {}", body.trim())
    };
    match status {
        StatusCode::NOT_FOUND => Error::NotFound(format!("{function}: {detail}")),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Unauthorized(format!("{function}: {detail}"))
        }
        _ => Error::remote(Some(status.as_u16()), format!("{function}: {detail}")),
    }
}
