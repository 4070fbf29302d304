use reqwest::{blocking::Client, Url};
use thiserror::Error;
use tracing::debug;

use crate::config::AppConfig;
use crate::models::Event;
use crate::populate::EventSaver;

const EVENTS_PATH: &str = "api/events";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid ingest url {0}")]
    InvalidUrl(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ingest endpoint answered {status}: {body}")]
    Status { status: u16, body: String },
}

/// Sends batches to a running server's ingestion endpoint in one `PUT`.
pub struct IngestClient {
    client: Client,
    endpoint: Url,
}

impl IngestClient {
    pub fn new(client: Client, base_url: &str) -> Result<Self, IngestError> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)
            .and_then(|base| base.join(EVENTS_PATH))
            .map_err(|_| IngestError::InvalidUrl(base_url.to_string()))?;
        Ok(Self { client, endpoint })
    }

    pub fn from_config(config: &AppConfig, base_url: &str) -> Result<Self, IngestError> {
        let client = Client::builder()
            .timeout(config.http_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Self::new(client, base_url)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn put_events(&self, events: &[Event]) -> Result<(), IngestError> {
        let response = self
            .client
            .put(self.endpoint.clone())
            .json(events)
            .send()?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().unwrap_or_default();
            return Err(IngestError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!(endpoint = %self.endpoint, count = events.len(), "batch accepted");
        Ok(())
    }
}

impl EventSaver for IngestClient {
    fn save_events(&self, events: &[Event]) -> anyhow::Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        self.put_events(events)?;
        Ok(events.len())
    }
}
