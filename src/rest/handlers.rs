//! Control-surface request handlers

use super::server::AppState;
use crate::config::RunConfig;
use crate::controller::StatusSnapshot;
use crate::error::BenchError;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Deserialize)]
pub struct StartRequest {
    /// Named handle registered with the connection registry, or a DSN.
    pub connection_id: String,
    #[serde(flatten)]
    pub config: RunConfig,
}

#[derive(Serialize)]
pub struct StartResponse {
    pub run_id: Uuid,
}

#[derive(Serialize)]
pub struct StopResponse {
    pub stopped: bool,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

fn error_response(err: BenchError) -> Response {
    let status = match &err {
        BenchError::InvalidConfig { .. } => StatusCode::BAD_REQUEST,
        BenchError::AlreadyRunning => StatusCode::CONFLICT,
        BenchError::NoActiveBenchmark => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: err.kind(),
        }),
    )
        .into_response()
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Start a benchmark run
pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> Response {
    let db = match state.connections.get(&request.connection_id) {
        Some(db) => Arc::clone(db),
        None => match crate::db::from_dsn(&request.connection_id) {
            Ok(db) => db,
            Err(err) => {
                error!(connection_id = %request.connection_id, error = %err, "unknown connection");
                return error_response(err);
            }
        },
    };

    let controller = match state.registry.create_controller(request.config, db) {
        Ok(controller) => controller,
        Err(err) => {
            error!(error = %err, "benchmark construction failed");
            return error_response(err);
        }
    };

    match state.gate.launch(controller) {
        Ok(run_id) => {
            info!(%run_id, "benchmark started");
            (StatusCode::OK, Json(StartResponse { run_id })).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// Stop the active benchmark
pub async fn stop(State(state): State<Arc<AppState>>) -> Response {
    match state.gate.stop() {
        Ok(()) => (StatusCode::OK, Json(StopResponse { stopped: true })).into_response(),
        Err(err) => error_response(err),
    }
}

/// Status of the active benchmark
pub async fn status(State(state): State<Arc<AppState>>) -> Response {
    match state.gate.status() {
        Ok(snapshot) => (StatusCode::OK, Json::<StatusSnapshot>(snapshot)).into_response(),
        Err(err) => error_response(err),
    }
}
