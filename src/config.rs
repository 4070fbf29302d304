use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::utils;

const DEFAULT_LISTEN: &str = "127.0.0.1:8090";
const DEFAULT_INGEST_URL: &str = "http://localhost:8090";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HTTP_RETRIES: u32 = 2;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
/// A full populate run for a large city ships a few thousand events at once.
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;
const DEFAULT_USER_AGENT: &str = "sortir/0.1 (+https://sortir.in)";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite file backing the event store. Defaults to the data directory.
    pub database: Option<PathBuf>,
    pub listen: String,
    /// Base URL of the server receiving `PUT /api/events` batches.
    pub ingest_url: String,
    pub http_timeout_secs: u64,
    pub http_retries: u32,
    pub user_agent: String,
    pub sweep_interval_secs: u64,
    /// Largest request body accepted by `PUT /api/events`.
    pub max_body_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: None,
            listen: DEFAULT_LISTEN.to_string(),
            ingest_url: DEFAULT_INGEST_URL.to_string(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            http_retries: DEFAULT_HTTP_RETRIES,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl AppConfig {
    /// Reads `config.json` from the data directory, then applies environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let mut config = read_config(&utils::config_path())?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config = read_config(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("SORTIR_DATABASE") {
            self.database = Some(PathBuf::from(path));
        }
        if let Some(listen) = lookup("SORTIR_LISTEN") {
            self.listen = listen;
        }
        if let Some(url) = lookup("SORTIR_INGEST_URL") {
            self.ingest_url = url;
        }
        if let Some(secs) = lookup("SORTIR_HTTP_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.http_timeout_secs = secs;
        }
        if let Some(retries) = lookup("SORTIR_HTTP_RETRIES").and_then(|s| s.parse().ok()) {
            self.http_retries = retries;
        }
        if let Some(agent) = lookup("SORTIR_USER_AGENT") {
            self.user_agent = agent;
        }
        if let Some(secs) = lookup("SORTIR_SWEEP_INTERVAL_SECS").and_then(|s| s.parse().ok()) {
            self.sweep_interval_secs = secs;
        }
        if let Some(bytes) = lookup("SORTIR_MAX_BODY_BYTES").and_then(|s| s.parse().ok()) {
            self.max_body_bytes = bytes;
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(utils::database_path)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn read_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("invalid config file {}", path.display()))
}
