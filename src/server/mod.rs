// SPDX-License-Identifier: MIT

//! HTTP surface for the state service
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/state` | Current record |
//! | POST | `/api/state` | Propose `{color, count}` |
//! | GET | `/api/health` | Liveness |
//!
//! Store I/O is blocking, so every handler hops onto the blocking pool.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::{LedError, StateError};
use crate::state::{ProposedUpdate, StateRecord, StateService};

/// Errors a handler can answer with
#[derive(Debug)]
pub enum ApiError {
    State(StateError),
    /// The blocking task panicked or was cancelled
    Internal(String),
}

impl From<StateError> for ApiError {
    fn from(err: StateError) -> Self {
        Self::State(err)
    }
}

impl From<task::JoinError> for ApiError {
    fn from(err: task::JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::State(StateError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            Self::State(StateError::StorageUnavailable { .. })
            | Self::State(StateError::RevisionExhausted(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::State(err) => err.to_string(),
            Self::Internal(msg) => format!("internal error: {}", msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {}", self.message());
        }
        (status, Json(json!({ "ok": false, "error": self.message() }))).into_response()
    }
}

/// Body of a successful POST: the new record with `ok: true` alongside
#[derive(Debug, Serialize)]
struct Accepted {
    ok: bool,
    #[serde(flatten)]
    record: StateRecord,
}

/// Build the application router
pub fn build_router(service: StateService, config: &ServerConfig) -> Router {
    let api = Router::new()
        .route("/api/state", get(get_state).post(set_state))
        .route("/api/health", get(health_check))
        .with_state(service)
        .layer(cors_layer(&config.allowed_origins));

    let app = match &config.static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api,
    };

    app.layer(TraceLayer::new_for_http())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if allowed_origins.is_empty() {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}

/// Bind and serve until the process is stopped
pub async fn serve(service: StateService, config: ServerConfig) -> Result<(), LedError> {
    let addr = config.socket_addr()?;
    let app = build_router(service, &config);

    let listener = TcpListener::bind(addr).await?;
    log::info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_state(State(service): State<StateService>) -> Result<Json<StateRecord>, ApiError> {
    let record = task::spawn_blocking(move || service.get_state()).await?;
    Ok(Json(record))
}

async fn set_state(
    State(service): State<StateService>,
    body: Bytes,
) -> Result<Json<Accepted>, ApiError> {
    let update = ProposedUpdate::from_body(&body);
    let record = task::spawn_blocking(move || service.set_state(&update)).await??;
    Ok(Json(Accepted { ok: true, record }))
}
