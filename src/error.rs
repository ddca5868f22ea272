//! Unified workflow error handling
//!
//! Every stage command returns a typed result; the HTTP layer maps each
//! variant to a stable status code and error code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::domain::Stage;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error("Stage '{0}' must complete first")]
    PrecursorMissing(Stage),

    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for WorkflowError {
    fn from(e: sqlx::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(rename = "missingStage", skip_serializing_if = "Option::is_none")]
    pub missing_stage: Option<Stage>,
    /// The same request may succeed when sent again
    pub retryable: bool,
}

impl WorkflowError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    /// Whether the same request may simply be sent again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamTimeout(_) | Self::Upstream(_) | Self::Persistence(_)
        )
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::InvalidWeights(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PrecursorMissing(_) => StatusCode::CONFLICT,
            Self::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::InvalidWeights(_) => "INVALID_WEIGHTS",
            Self::PrecursorMissing(_) => "PRECURSOR_MISSING",
            Self::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn public_message(&self) -> String {
        match self {
            // Don't leak internal error details
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::Persistence(_) => "Workflow state store is unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        match &self {
            Self::Internal(e) => {
                tracing::error!(error = ?e, "Internal error");
            }
            Self::Persistence(e) => {
                tracing::error!(error = %e, "Persistence error");
            }
            Self::Upstream(_) | Self::UpstreamTimeout(_) => {
                tracing::warn!(error = %self, "Upstream collaborator failed");
            }
            _ => {
                tracing::debug!(error = %self, "Stage command rejected");
            }
        }

        let missing_stage = match &self {
            Self::PrecursorMissing(stage) => Some(*stage),
            _ => None,
        };

        let status = self.status_code();
        let body = ErrorResponse {
            code: self.error_code().to_string(),
            message: self.public_message(),
            missing_stage,
            retryable: self.is_retryable(),
        };

        (status, Json(body)).into_response()
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precursor_missing_names_stage() {
        let err = WorkflowError::PrecursorMissing(Stage::SupplierMatching);
        assert_eq!(err.to_string(), "Stage 'supplier_matching' must complete first");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = WorkflowError::Internal(anyhow::anyhow!("secret connection string"));
        assert_eq!(err.public_message(), "An internal error occurred");
        assert!(WorkflowError::UpstreamTimeout("x".into()).is_retryable());
    }
}
