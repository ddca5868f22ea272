use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;

use super::AuthContext;
use crate::app::AppState;
use crate::error::WorkflowError;

/// Extractor that requires authentication
/// Use this in route handlers to require a valid JWT
///
/// Example:
/// ```ignore
/// async fn protected_route(auth: RequireAuth) -> impl IntoResponse {
///     format!("Hello, {}", auth.subject)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthContext);

impl std::ops::Deref for RequireAuth {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = WorkflowError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| WorkflowError::Unauthorized("Missing authorization token".to_string()))?
            .to_str()
            .map_err(|_| WorkflowError::Unauthorized("Invalid authorization format".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .ok_or_else(|| WorkflowError::Unauthorized("Invalid authorization format".to_string()))?;

        if token.is_empty() {
            return Err(WorkflowError::Unauthorized("Missing authorization token".to_string()));
        }

        let claims = state.verifier.verify_token(token).map_err(|e| {
            tracing::warn!(error = %e, "JWT verification failed");
            WorkflowError::Unauthorized("Invalid or expired token".to_string())
        })?;

        let context = AuthContext::from_claims(&claims).map_err(|e| {
            tracing::warn!(error = %e, "Failed to build auth context");
            WorkflowError::Unauthorized("Invalid or expired token".to_string())
        })?;

        Ok(RequireAuth(context))
    }
}
