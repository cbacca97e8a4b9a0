//! HTTP server: webhook ingestion and the suggestion query/apply API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ingest/github` | Webhook delivery (`X-GitHub-Event`, `X-Hub-Signature-256`) |
//! | `GET`  | `/issues/{number}/triage` | Current suggestion, `null` if none yet |
//! | `POST` | `/issues/{number}/apply` | Append an `APPLY_SUGGESTION` decision log |
//! | `GET`  | `/health` | Health check (returns version, mode, and trust mode) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "issue #7 not found" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! A delivery is answered `202 {"status":"accepted"}` whether it was
//! processed, ignored, or failed; only a signature failure is a 400.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::info;

use triage_core::models::TriageSuggestion;
use triage_core::store::TriageStore;

use crate::config::{Config, Mode};
use crate::db;
use crate::error::TriageError;
use crate::migrate::migrate_pool;
use crate::pipeline::{build_pipeline, Pipeline};
use crate::signature::SIGNATURE_HEADER;
use crate::sqlite_store::SqliteStore;
use crate::suggestions::{apply_suggestion, get_current_suggestion};

pub const EVENT_HEADER: &str = "x-github-event";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// `None` in live mode: there is nothing to query.
    pub store: Option<Arc<dyn TriageStore>>,
}

/// Router with all routes and request tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ingest/github", post(handle_ingest))
        .route("/issues/{number}/triage", get(handle_get_triage))
        .route("/issues/{number}/apply", post(handle_apply))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`.
///
/// In persistent mode the database is opened and migrated first. Runs
/// until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store: Option<Arc<dyn TriageStore>> = match config.pipeline.mode {
        Mode::Persistent => {
            let pool = db::connect(config).await?;
            migrate_pool(&pool).await?;
            Some(Arc::new(SqliteStore::new(pool)))
        }
        Mode::Live => None,
    };

    let pipeline = build_pipeline(config, store.clone())?;
    let state = AppState {
        pipeline: Arc::new(pipeline),
        store,
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(
        bind = %config.server.bind,
        mode = config.pipeline.mode.as_str(),
        "triage server listening"
    );
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

impl From<TriageError> for AppError {
    fn from(err: TriageError) -> Self {
        match err {
            TriageError::Authentication(message) => AppError {
                status: StatusCode::BAD_REQUEST,
                code: "bad_request",
                message,
            },
            TriageError::NotFound(message) => not_found(message),
            other => {
                tracing::error!(error = %other, "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message: other.to_string(),
                }
            }
        }
    }
}

fn require_store(state: &AppState) -> Result<&dyn TriageStore, AppError> {
    state
        .store
        .as_deref()
        .ok_or_else(|| not_found("no suggestions are stored in live mode"))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    mode: String,
    trust_mode: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        mode: state.pipeline.mode().as_str().to_string(),
        trust_mode: state.pipeline.is_trust_mode(),
    })
}

// ============ POST /ingest/github ============

/// Raw body bytes are verified before parsing. Processing runs inline
/// under the pipeline's event timeout.
async fn handle_ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let event_type = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    state
        .pipeline
        .handle_delivery(event_type, signature, &body)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "accepted" })),
    ))
}

// ============ GET /issues/{number}/triage ============

async fn handle_get_triage(
    State(state): State<AppState>,
    Path(number): Path<u64>,
) -> Result<Json<Option<TriageSuggestion>>, AppError> {
    let store = require_store(&state)?;
    let suggestion = get_current_suggestion(store, number).await?;
    Ok(Json(suggestion))
}

// ============ POST /issues/{number}/apply ============

#[derive(Serialize)]
struct ApplyResponse {
    applied: bool,
    decision_id: String,
}

async fn handle_apply(
    State(state): State<AppState>,
    Path(number): Path<u64>,
) -> Result<Json<ApplyResponse>, AppError> {
    let store = require_store(&state)?;
    let log = apply_suggestion(store, number).await?;
    Ok(Json(ApplyResponse {
        applied: true,
        decision_id: log.id,
    }))
}
