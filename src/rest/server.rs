//! Control-surface server implementation

use super::handlers;
use crate::db::Database;
use crate::registry::{ActiveRunGate, BenchmarkRegistry};
use axum::{
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared server state: the family registry, the at-most-one-run gate,
/// and the named database handles the connection registry provided.
pub struct AppState {
    pub registry: BenchmarkRegistry,
    pub gate: ActiveRunGate,
    pub connections: HashMap<String, Arc<dyn Database>>,
}

pub struct RestServer {
    addr: String,
    state: Arc<AppState>,
}

impl RestServer {
    pub fn new(connections: HashMap<String, Arc<dyn Database>>) -> Self {
        Self::with_addr("0.0.0.0:8080", connections)
    }

    pub fn with_addr(addr: &str, connections: HashMap<String, Arc<dyn Database>>) -> Self {
        Self {
            addr: addr.to_string(),
            state: Arc::new(AppState {
                registry: BenchmarkRegistry::with_builtin(),
                gate: ActiveRunGate::new(),
                connections,
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/v1/benchmark/start", post(handlers::start))
            .route("/api/v1/benchmark/stop", post(handlers::stop))
            .route("/api/v1/benchmark/status", get(handlers::status))
            .layer(CorsLayer::permissive())
            .with_state(Arc::clone(&self.state))
    }

    /// Start the control-surface server
    pub async fn serve(self) -> anyhow::Result<()> {
        let app = self.router();
        info!("control surface listening on {}", self.addr);
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}
