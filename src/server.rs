use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::db::Store;
use crate::models::{Bounds, Event, Pin};
use crate::pins::PinsService;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

#[derive(Clone)]
pub struct ServerState {
    store: Arc<Store>,
    pins: PinsService,
    max_body_bytes: usize,
}

impl ServerState {
    pub fn new(store: Arc<Store>) -> Self {
        let pins = PinsService::new(store.clone());
        Self {
            store,
            pins,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_body_limit(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

pub fn make_app(state: ServerState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);
    Router::new()
        .route("/api/events", put(put_events))
        .route("/api/pins", get(get_pins))
        .route("/api/health", get(health))
        .layer(body_limit)
        .with_state(state)
}

/// PUT /api/events - upsert a batch; invalid events are dropped silently
async fn put_events(
    State(state): State<ServerState>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let events: Vec<Event> = serde_json::from_slice(&body)
        .map_err(|err| ApiError::BadRequest(format!("invalid events batch: {err}")))?;
    let received = events.len();

    let store = state.store.clone();
    let saved = tokio::task::spawn_blocking(move || store.upsert_valid(&events, Utc::now()))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    info!(received, saved, "events batch ingested");
    Ok(Json(MessageResponse {
        message: "Events batch updated",
    }))
}

/// GET /api/pins?north=&south=&east=&west=&max_time=
async fn get_pins(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Pin>>, ApiError> {
    let (bounds, max_time) = parse_pins_query(&params)?;

    let pins = state.pins.clone();
    let found = tokio::task::spawn_blocking(move || pins.get_pins(&bounds, max_time))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    debug!(pins = found.len(), "pins query answered");
    Ok(Json(found))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

fn parse_pins_query(params: &HashMap<String, String>) -> Result<(Bounds, DateTime<Utc>), ApiError> {
    let coordinate = |name: &str| -> Result<f64, ApiError> {
        let raw = params
            .get(name)
            .ok_or_else(|| ApiError::BadRequest(format!("missing parameter {name}")))?;
        raw.trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| ApiError::BadRequest(format!("invalid parameter {name}: {raw}")))
    };

    let bounds = Bounds {
        north: coordinate("north")?,
        south: coordinate("south")?,
        east: coordinate("east")?,
        west: coordinate("west")?,
    };

    let raw_time = params
        .get("max_time")
        .ok_or_else(|| ApiError::BadRequest("missing parameter max_time".to_string()))?;
    let max_time = DateTime::parse_from_rfc3339(raw_time.trim())
        .map_err(|err| ApiError::BadRequest(format!("invalid parameter max_time: {err}")))?
        .with_timezone(&Utc);

    Ok((bounds, max_time))
}

/// Deletes ended events every `period` until the runtime shuts down.
pub fn spawn_sweeper(store: Arc<Store>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let store = store.clone();
            match tokio::task::spawn_blocking(move || store.delete_expired(Utc::now())).await {
                Ok(Ok(0)) => {}
                Ok(Ok(deleted)) => info!(deleted, "expired events swept"),
                Ok(Err(err)) => error!(error = %err, "expiry sweep failed"),
                Err(err) => error!(error = %err, "expiry sweep task failed"),
            }
        }
    })
}

pub async fn serve(
    listen: &str,
    store: Arc<Store>,
    sweep_every: Duration,
    max_body_bytes: usize,
) -> Result<()> {
    let sweeper = spawn_sweeper(store.clone(), sweep_every);
    let app = make_app(ServerState::new(store).with_body_limit(max_body_bytes));

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("unable to listen on {listen}"))?;
    info!("Ready to serve at {listen}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed");
    sweeper.abort();
    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down");
}
