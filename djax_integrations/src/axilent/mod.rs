//! reqwest-backed client for the Axilent content, calendar, messaging and
//! trigger APIs.
//!
//! Every call is a JSON POST to `{endpoint}/api/{version}/axilent/{app}/{function}/`
//! authenticated with the API key as a bearer token. Content type names are
//! slugified before they go on the wire.

mod calendar;
pub mod connection;
mod content;
mod messaging;
mod triggers;
pub mod wire;

use std::sync::Arc;

use djax_core::Result;
use djax_core::config::AxilentConfig;

pub use connection::{App, AxilentConnection};

/// Implements every remote trait in `djax_core::remote`.
#[derive(Clone, Debug)]
pub struct AxilentClient {
    cx: Arc<AxilentConnection>,
}

impl AxilentClient {
    pub fn new(config: &AxilentConfig) -> Result<Self> {
        Ok(Self {
            cx: Arc::new(AxilentConnection::new(config)?),
        })
    }

    /// `None` when no API key is configured; the integration then stays inactive.
    pub fn from_config(config: &AxilentConfig) -> Result<Option<Self>> {
        if !config.is_configured() {
            tracing::info!("AXILENT_API_KEY not set; remote integration disabled");
            return Ok(None);
        }
        Self::new(config).map(Some)
    }

    pub fn connection(&self) -> &AxilentConnection {
        &self.cx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_yields_no_client() {
        let config = AxilentConfig::default();
        assert!(AxilentClient::from_config(&config).unwrap().is_none());

        let config = AxilentConfig {
            api_key: Some("k".to_string()),
            ..AxilentConfig::default()
        };
        let client = AxilentClient::from_config(&config).unwrap().unwrap();
        assert!(
            client
                .connection()
                .url(App::Content, "getcontent")
                .starts_with("https://www.axilent.net/api/beta3/")
        );
    }
}
