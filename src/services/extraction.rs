//! Client for the document extraction service.
//!
//! The extraction service turns a raw bill of materials (an uploaded
//! document's text or free text) into a structured item set. The core only
//! trusts its output after validation.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::domain::{Item, ItemSet, ItemSource};
use crate::error::{WorkflowError, WorkflowResult};

/// Source of structured item sets
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        document: &str,
        item_count_hint: Option<u32>,
        request_id: Option<&str>,
    ) -> WorkflowResult<ItemSet>;

    async fn health_check(&self) -> WorkflowResult<()> {
        Ok(())
    }
}

/// HTTP client for the extraction service.
#[derive(Clone)]
pub struct ExtractionClient {
    client: Client,
    base_url: String,
    token: String,
}

/// Error response from the extraction service.
#[derive(Debug, Deserialize)]
struct ExtractionErrorResponse {
    message: String,
}

impl ExtractionClient {
    pub fn new(base_url: &str, token: &str, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        tracing::info!(base_url = base_url, "Extraction client initialized");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    async fn post<T: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
        request_id: Option<&str>,
    ) -> WorkflowResult<R> {
        let url = format!("{}{}", self.base_url, path);

        let mut req = self
            .client
            .post(&url)
            .header("X-Internal-Token", &self.token)
            .header("Content-Type", "application/json");

        if let Some(rid) = request_id {
            req = req.header("x-request-id", rid);
        }

        debug!(url = %url, "Extraction service request");

        let response = req.json(body).send().await.map_err(|e| {
            error!(error = %e, "Extraction service request failed");
            if e.is_timeout() {
                WorkflowError::UpstreamTimeout("extraction service did not respond in time".to_string())
            } else {
                WorkflowError::upstream(format!("extraction service unavailable: {}", e))
            }
        })?;

        let status = response.status();

        if status.is_success() {
            response.json::<R>().await.map_err(|e| {
                error!(error = %e, "Failed to parse extraction service response");
                WorkflowError::upstream(format!("invalid extraction service response: {}", e))
            })
        } else {
            let message = response
                .json::<ExtractionErrorResponse>()
                .await
                .ok()
                .map(|e| e.message)
                .unwrap_or_else(|| format!("extraction service error: {}", status));

            if !matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY) {
                error!(status = %status, message = %message, "Extraction service error");
            }
            Err(status_error(status, message))
        }
    }
}

fn status_error(status: StatusCode, message: String) -> WorkflowError {
    match status {
        // The document itself was rejected
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            WorkflowError::InvalidInput(message)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            WorkflowError::upstream("extraction service auth error")
        }
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => {
            WorkflowError::UpstreamTimeout(message)
        }
        _ => WorkflowError::upstream(message),
    }
}

#[async_trait]
impl Extractor for ExtractionClient {
    #[instrument(skip(self, document), fields(document_len = document.len()))]
    async fn extract(
        &self,
        document: &str,
        item_count_hint: Option<u32>,
        request_id: Option<&str>,
    ) -> WorkflowResult<ItemSet> {
        #[derive(Serialize)]
        struct Request<'a> {
            document_text: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            item_count_hint: Option<u32>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Response {
            project_name: String,
            items: Vec<Item>,
        }

        let response: Response = self
            .post(
                "/v1/bom/extract",
                &Request {
                    document_text: document,
                    item_count_hint,
                },
                request_id,
            )
            .await?;

        Ok(ItemSet {
            total_estimated_cost: ItemSet::compute_total(&response.items).unwrap_or_default(),
            project_name: response.project_name,
            items: response.items,
            extracted_at: Utc::now(),
            source: ItemSource::Extractor,
        })
    }

    async fn health_check(&self) -> WorkflowResult<()> {
        let url = format!("{}/health", self.base_url);

        self.client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| WorkflowError::upstream(format!("extraction service unhealthy: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let msg = || "boom".to_string();
        assert!(matches!(
            status_error(StatusCode::UNPROCESSABLE_ENTITY, msg()),
            WorkflowError::InvalidInput(m) if m == "boom"
        ));
        assert!(matches!(
            status_error(StatusCode::GATEWAY_TIMEOUT, msg()),
            WorkflowError::UpstreamTimeout(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, msg()),
            WorkflowError::Upstream(m) if m == "extraction service auth error"
        ));
        assert!(matches!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, msg()),
            WorkflowError::Upstream(_)
        ));
    }

    #[test]
    fn test_client_trims_base_url() {
        let client = ExtractionClient::new("http://extraction:8000/", "t", 5).unwrap();
        assert_eq!(client.base_url, "http://extraction:8000");
    }
}
