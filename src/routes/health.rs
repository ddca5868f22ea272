use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
    /// Workspaces with a stage invocation running or queued
    pub active_workspaces: usize,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub state_store: String,
    pub redis: String,
    pub extraction_service: String,
}

/// Health check endpoint - public
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let redis_check = async {
        match &state.cache {
            Some(cache) => cache.health_check().await.map(|_| "ok"),
            None => Ok("disabled"),
        }
    };

    let (store_result, redis_result, extraction_result) = tokio::join!(
        state.machine.store().health_check(),
        redis_check,
        state.machine.extractor().health_check(),
    );

    let store_status = if store_result.is_ok() { "ok" } else { "error" };
    let redis_status = redis_result.unwrap_or("error");
    let extraction_status = if extraction_result.is_ok() { "ok" } else { "error" };

    // The state store is critical, the rest only degrade the service
    let status = if store_result.is_err() {
        "unhealthy"
    } else if redis_status == "error" || extraction_result.is_err() {
        "degraded"
    } else {
        "healthy"
    };

    let status_code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: ServiceHealth {
                state_store: store_status.to_string(),
                redis: redis_status.to_string(),
                extraction_service: extraction_status.to_string(),
            },
            active_workspaces: state.machine.active_workspaces(),
        }),
    )
}
