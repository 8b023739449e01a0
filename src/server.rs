//! HTTP surface: start a run, poll its status, cancel it.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::config::ServerSection;
use crate::payload::Payload;
use crate::run::{RunSnapshot, Supervisor};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub supervisor: Supervisor,
}

pub type SharedState = Arc<AppState>;

// ── Request / response types ──────────────────────────────────────────

/// Submission body: a bare payload or one wrapped in `input_json`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StartRequest {
    Wrapped { input_json: Payload },
    Direct(Payload),
}

impl StartRequest {
    pub fn into_payload(self) -> Payload {
        match self {
            Self::Wrapped { input_json } => input_json,
            Self::Direct(payload) => payload,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub job_id: Uuid,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found"),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/start", post(start_run))
        .route("/api/status/{id}", get(run_status))
        .route("/api/cancel/{id}", post(cancel_run))
}

pub fn build_router(state: SharedState) -> Router {
    api_router()
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn start_run(
    State(state): State<SharedState>,
    Json(request): Json<StartRequest>,
) -> Json<StartResponse> {
    let run = state.supervisor.submit(request.into_payload());
    Json(StartResponse { job_id: run.id() })
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound)
}

async fn run_status(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<RunSnapshot>, ApiError> {
    let id = parse_id(&id)?;
    state.supervisor.status(&id).map(Json).ok_or(ApiError::NotFound)
}

async fn cancel_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<RunSnapshot>, ApiError> {
    let id = parse_id(&id)?;
    state.supervisor.cancel(&id).map(Json).ok_or(ApiError::NotFound)
}

// ── Server ────────────────────────────────────────────────────────────

/// Bind and serve until Ctrl+C.
pub async fn start_server(supervisor: Supervisor, settings: &ServerSection) -> Result<()> {
    let app = build_router(Arc::new(AppState { supervisor }));

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "overseer listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
