pub mod health;
pub mod workflow;

use axum::{routing::get, routing::post, Router};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        // Stage commands
        .route(
            "/workspaces/:workspace_id/stages/:stage",
            post(workflow::run_stage),
        )
        // Resumption queries
        .route("/workspaces/:workspace_id/status", get(workflow::get_status))
        .route("/workspaces/:workspace_id/state", get(workflow::get_state))
        .route(
            "/workspaces/:workspace_id/artifacts/:artifact",
            get(workflow::get_artifact),
        )
}
