//! HTTP surface: webhook ingestion, approval replies, and health.
//!
//! Webhook bodies are verified against the shared HMAC secret before any
//! parsing happens; a bad signature is a 401 and the event is dropped.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::adapters::verify_signature;
use crate::dispatch::Dispatcher;
use crate::errors::{AdapterError, ApprovalError, DispatchError};
use crate::issue::SourceType;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub dispatcher: Dispatcher,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ApprovalReplyRequest {
    pub text: String,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    Unauthorized,
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "signature verification failed".to_string(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/webhook/{source}", post(receive_webhook))
        .route("/approvals/reply", post(approval_reply))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
        .route("/sources/{source}/enable", post(enable_source))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn receive_webhook(
    State(state): State<SharedState>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let source_type: SourceType = source
        .parse()
        .map_err(|_| ApiError::NotFound(format!("unknown source '{source}'")))?;
    let adapter = state
        .dispatcher
        .sources()
        .get(source_type)
        .ok_or_else(|| ApiError::NotFound(format!("source '{source}' is not registered")))?;

    if let Some(secret) = &state.dispatcher.config().webhook_secret {
        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(secret, &body, signature) {
            tracing::warn!(source = %source_type, "webhook rejected: bad signature");
            return Err(ApiError::Unauthorized);
        }
    }

    let issues = adapter.parse_webhook(&body).map_err(|e| match e {
        AdapterError::MalformedPayload { .. } => ApiError::BadRequest(e.to_string()),
        _ => ApiError::Internal(e.to_string()),
    })?;

    let mut job_ids = Vec::new();
    let mut duplicates = 0usize;
    for issue in issues {
        match state.dispatcher.evaluate_and_dispatch(issue).await {
            Ok(job_id) => job_ids.push(job_id),
            Err(DispatchError::DuplicateEvent { .. }) => duplicates += 1,
            Err(e) => return Err(ApiError::Internal(e.to_string())),
        }
    }
    state.dispatcher.process_queue().await;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "accepted": job_ids.len(),
            "duplicates": duplicates,
            "job_ids": job_ids,
        })),
    )
        .into_response())
}

async fn approval_reply(
    State(state): State<SharedState>,
    Json(request): Json<ApprovalReplyRequest>,
) -> Result<Response, ApiError> {
    let job_id = state
        .dispatcher
        .resolve_approval(&request.text)
        .map_err(|e| match e {
            ApprovalError::BadReply { .. } => ApiError::BadRequest(e.to_string()),
            ApprovalError::UnknownJob { .. } => ApiError::NotFound(e.to_string()),
            ApprovalError::AlreadyResolved { .. } => ApiError::Conflict(e.to_string()),
            _ => ApiError::Internal(e.to_string()),
        })?;
    Ok(Json(serde_json::json!({"job_id": job_id})).into_response())
}

async fn get_job(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let job = state
        .dispatcher
        .job(id)
        .ok_or_else(|| ApiError::NotFound(format!("no job {id}")))?;
    Ok(Json(job).into_response())
}

async fn cancel_job(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    if state.dispatcher.cancel(id) {
        Ok(StatusCode::ACCEPTED.into_response())
    } else {
        Err(ApiError::NotFound(format!("no executing job {id}")))
    }
}

async fn enable_source(
    State(state): State<SharedState>,
    Path(source): Path<String>,
) -> Result<Response, ApiError> {
    let source_type: SourceType = source
        .parse()
        .map_err(|_| ApiError::NotFound(format!("unknown source '{source}'")))?;
    state.dispatcher.sources().enable(source_type);
    tracing::info!(source = %source_type, "source manually re-enabled");
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn health(State(state): State<SharedState>) -> Response {
    let depths = state.dispatcher.queue_depths().await;
    let queue: serde_json::Map<String, serde_json::Value> = depths
        .iter()
        .map(|(priority, depth)| (priority.as_str().to_string(), (*depth).into()))
        .collect();
    Json(serde_json::json!({
        "status": "ok",
        "queue": queue,
        "executing": state.dispatcher.executing_count().await,
        "pending_approvals": state.dispatcher.pending_approvals(),
        "sources": state.dispatcher.sources().health(),
    }))
    .into_response()
}

// ── Startup ───────────────────────────────────────────────────────────

pub async fn start_server(dispatcher: Dispatcher, port: u16) -> Result<()> {
    let state = Arc::new(AppState { dispatcher });
    let app = build_router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!(addr = %listener.local_addr()?, "triage server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("shutting down");
}
