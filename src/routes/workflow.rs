//! Workflow routes
//!
//! One command endpoint per stage plus the status and state queries of a
//! workspace.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::api::DataResponse;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::Stage;
use crate::error::{WorkflowError, WorkflowResult};
use crate::middleware::RequestIdExt;

/// POST /workspaces/:workspace_id/stages/:stage
///
/// Run one stage. The body shape depends on the stage; stages without
/// required fields accept an empty body.
pub async fn run_stage(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((workspace_id, stage)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WorkflowError> {
    let stage = Stage::parse(&stage)
        .filter(|s| Stage::RUNNABLE.contains(s))
        .ok_or_else(|| WorkflowError::NotFound(format!("Unknown stage '{}'", stage)))?;

    tracing::info!(
        subject = %auth.subject,
        role = ?auth.role,
        workspace_id = %workspace_id,
        stage = %stage,
        "Running stage"
    );

    let machine = &state.machine;
    let ws = workspace_id.as_str();

    let outcome = match stage {
        Stage::Extraction => {
            machine
                .extraction(ws, parse_body(&body)?, headers.request_id())
                .await?
        }
        Stage::Compliance => machine.compliance(ws).await?,
        Stage::SupplierMatching => machine.supplier_matching(ws, parse_body(&body)?).await?,
        Stage::Rfq => machine.rfq(ws, parse_body(&body)?).await?,
        Stage::BidComparison => machine.bid_comparison(ws, parse_body(&body)?).await?,
        Stage::BidAccepted => machine.bid_accepted(ws, parse_body(&body)?).await?,
        Stage::Contract => machine.contract(ws, parse_body(&body)?).await?,
        Stage::PurchaseOrder => machine.purchase_order(ws, parse_body(&body)?).await?,
        Stage::Shipment => machine.shipment(ws, parse_body(&body)?).await?,
        Stage::Delivery => machine.delivery(ws, parse_body(&body)?).await?,
        Stage::QualityControl => machine.quality_control(ws, parse_body(&body)?).await?,
        Stage::NotStarted | Stage::Completed => {
            return Err(WorkflowError::NotFound(format!("Stage '{}' has no command", stage)));
        }
    };

    Ok(Json(DataResponse::new(outcome)))
}

/// GET /workspaces/:workspace_id/status
pub async fn get_status(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
) -> Result<impl IntoResponse, WorkflowError> {
    let status = state.machine.status(&workspace_id).await?;
    Ok(Json(DataResponse::new(status)))
}

/// GET /workspaces/:workspace_id/state
///
/// Full persisted state including every artifact.
pub async fn get_state(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
) -> Result<impl IntoResponse, WorkflowError> {
    let workflow = state.machine.state(&workspace_id).await?;
    Ok(Json(DataResponse::new(workflow)))
}

/// GET /workspaces/:workspace_id/artifacts/:artifact
///
/// A single artifact by its key, e.g. `matchSet` or `purchaseOrder`.
pub async fn get_artifact(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((workspace_id, artifact)): Path<(String, String)>,
) -> Result<impl IntoResponse, WorkflowError> {
    let value = state.machine.artifact(&workspace_id, &artifact).await?;
    Ok(Json(DataResponse::new(value)))
}

/// An empty body reads as `{}`
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> WorkflowResult<T> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };
    serde_json::from_slice(raw).map_err(|e| WorkflowError::invalid(format!("Invalid request body: {}", e)))
}
