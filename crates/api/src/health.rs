use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::AppState;

pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

pub fn mark_server_start() {
    SERVER_START.get_or_init(Instant::now);
}

fn uptime() -> Duration {
    SERVER_START.get().map(|start| start.elapsed()).unwrap_or_default()
}

/// Basic liveness check - just returns 200 OK
/// GET /health
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness check - verifies the database and the storage backend
/// GET /health/ready
pub async fn readiness(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let db_start = Instant::now();
    let db_healthy = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => true,
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            false
        }
    };
    let db_latency = db_start.elapsed().as_millis() as u64;

    let (storage_healthy, storage_latency) = match state.storage.health_check().await {
        Ok(latency) => (true, Some(latency)),
        Err(e) => {
            tracing::error!("Storage health check failed ({}): {}", state.storage.backend_name(), e);
            (false, None)
        }
    };

    let checks = json!([
        {
            "name": "database",
            "status": if db_healthy { "healthy" } else { "unhealthy" },
            "latency_ms": db_latency,
        },
        {
            "name": "storage",
            "backend": state.storage.backend_name(),
            "status": if storage_healthy { "healthy" } else { "unhealthy" },
            "latency_ms": storage_latency,
        }
    ]);

    let ready = db_healthy && storage_healthy;
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(json!({
            "status": if ready { "ready" } else { "not_ready" },
            "version": CURRENT_VERSION,
            "uptime_seconds": uptime().as_secs(),
            "checks": checks,
        })),
    )
}
