use std::{thread, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    Url,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::AppConfig;

/// Exponential backoff with jitter for upstream calls.
///
/// Only transport failures and 5xx answers are retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based): the capped exponential
    /// step plus up to half of it again as jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self
            .initial_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.max_backoff_ms);
        let jitter = if base > 1 {
            rand::rng().random_range(0..=base / 2)
        } else {
            0
        };
        Duration::from_millis(base + jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 5_000,
        }
    }
}

/// Blocking HTTP access shared by the collectors.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .context("unable to build http client")?;
        let retry = RetryPolicy {
            max_retries: config.http_retries,
            ..RetryPolicy::default()
        };
        Ok(Self::new(client, retry))
    }

    pub fn get_text(&self, url: Url) -> Result<String> {
        self.send(&url, || self.client.get(url.clone()))
    }

    pub fn post_json<B: Serialize>(
        &self,
        url: Url,
        body: &B,
        headers: &[(&str, String)],
    ) -> Result<String> {
        let payload = serde_json::to_vec(body).context("unable to encode request body")?;
        self.send(&url, || {
            let mut request = self
                .client
                .post(url.clone())
                .header("Content-Type", "application/json;charset=UTF-8")
                .body(payload.clone());
            for (name, value) in headers {
                request = request.header(*name, value);
            }
            request
        })
    }

    fn send<F>(&self, url: &Url, build: F) -> Result<String>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let outcome = build().send();
            if attempt < self.retry.max_retries && should_retry(&outcome) {
                let delay = self.retry.backoff(attempt);
                match &outcome {
                    Ok(response) => {
                        warn!(%url, status = %response.status(), attempt, ?delay, "upstream error, retrying")
                    }
                    Err(err) => {
                        warn!(%url, error = %err, attempt, ?delay, "request failed, retrying")
                    }
                }
                thread::sleep(delay);
                attempt += 1;
                continue;
            }

            let response = outcome.with_context(|| format!("request failed for {url}"))?;
            let response = response
                .error_for_status()
                .with_context(|| format!("non-success status for {url}"))?;
            return response
                .text()
                .with_context(|| format!("unable to read response body for {url}"));
        }
    }
}

fn should_retry(outcome: &reqwest::Result<Response>) -> bool {
    match outcome {
        Ok(response) => response.status().is_server_error(),
        Err(_) => true,
    }
}

/// A JSON scalar that upstreams send either as a number or as a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Loose {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl Loose {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Loose::Number(value) => Some(*value),
            Loose::Text(text) => text.trim().parse().ok(),
            Loose::Other(_) => None,
        }
    }

    /// Unix epoch seconds, in either representation.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Loose::Number(value) if value.fract() == 0.0 => {
                Utc.timestamp_opt(*value as i64, 0).single()
            }
            Loose::Text(text) => parse_epoch_seconds(text),
            _ => None,
        }
    }
}

pub fn parse_epoch_seconds(text: &str) -> Option<DateTime<Utc>> {
    let seconds: i64 = text.trim().parse().ok()?;
    Utc.timestamp_opt(seconds, 0).single()
}

/// Coordinates that fail to parse fall back to zero.
pub fn coordinate(value: Option<&Loose>) -> f64 {
    value.and_then(Loose::as_f64).unwrap_or(0.0)
}

/// Upstream prices of zero mean "not given", so they are dropped along with
/// anything that is not a finite positive amount.
pub fn normalize_price(value: Option<&Loose>) -> Option<f64> {
    value
        .and_then(Loose::as_f64)
        .filter(|price| price.is_finite() && *price > 0.0)
}

pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
