//! Notification delivery
//!
//! RFQs go out to suppliers and stage completions go out to whoever watches
//! the workspace. The transport is a webhook; without one configured events
//! are only logged.

use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::domain::{RfqAck, RfqDocument};
use crate::error::{WorkflowError, WorkflowResult};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_rfq(&self, supplier_id: &str, rfq: &RfqDocument) -> WorkflowResult<RfqAck>;

    async fn notify(&self, workspace_id: &str, message: &str) -> WorkflowResult<()>;
}

#[derive(Debug, Serialize)]
#[serde(tag = "event")]
enum WebhookEvent<'a> {
    #[serde(rename = "rfq.sent", rename_all = "camelCase")]
    RfqSent {
        supplier_id: &'a str,
        rfq: &'a RfqDocument,
    },
    #[serde(rename = "workflow.updated", rename_all = "camelCase")]
    WorkflowUpdated {
        workspace_id: &'a str,
        message: &'a str,
    },
}

#[derive(Debug, Default, Deserialize)]
struct WebhookReceipt {
    #[serde(default)]
    reference: Option<String>,
}

/// Posts events as JSON to a configured URL, retrying transient failures
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    max_elapsed: Duration,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: &str, max_elapsed: Duration) -> Self {
        Self {
            client,
            url: url.to_string(),
            max_elapsed,
        }
    }

    async fn post(&self, event: &WebhookEvent<'_>) -> WorkflowResult<WebhookReceipt> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_elapsed_time: Some(self.max_elapsed),
            ..ExponentialBackoff::default()
        };

        backoff::future::retry(policy, || async move {
            let response = self
                .client
                .post(&self.url)
                .json(event)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(WorkflowError::upstream(e.to_string())))?;

            let status = response.status();
            if status.is_server_error() || status.as_u16() == 429 {
                tracing::warn!(status = %status, "Webhook delivery failed, retrying");
                return Err(backoff::Error::transient(WorkflowError::upstream(format!(
                    "webhook returned {}",
                    status
                ))));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(WorkflowError::upstream(format!(
                    "webhook rejected event with {}",
                    status
                ))));
            }

            // Receivers are not required to answer with a body
            Ok(response.json::<WebhookReceipt>().await.unwrap_or_default())
        })
        .await
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(skip(self, rfq), fields(rfq_id = %rfq.rfq_id))]
    async fn send_rfq(&self, supplier_id: &str, rfq: &RfqDocument) -> WorkflowResult<RfqAck> {
        let receipt = self
            .post(&WebhookEvent::RfqSent { supplier_id, rfq })
            .await?;

        tracing::info!(
            supplier_id = supplier_id,
            rfq_id = %rfq.rfq_id,
            "RFQ delivered"
        );

        Ok(RfqAck {
            delivered: true,
            reference: receipt.reference,
        })
    }

    #[instrument(skip(self, message))]
    async fn notify(&self, workspace_id: &str, message: &str) -> WorkflowResult<()> {
        self.post(&WebhookEvent::WorkflowUpdated {
            workspace_id,
            message,
        })
        .await?;
        Ok(())
    }
}

/// Logs events when no webhook is configured
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_rfq(&self, supplier_id: &str, rfq: &RfqDocument) -> WorkflowResult<RfqAck> {
        tracing::info!(
            supplier_id = supplier_id,
            rfq_id = %rfq.rfq_id,
            items = rfq.items.len(),
            response_due_by = %rfq.response_due_by,
            "RFQ issued"
        );

        Ok(RfqAck {
            delivered: false,
            reference: None,
        })
    }

    async fn notify(&self, workspace_id: &str, message: &str) -> WorkflowResult<()> {
        tracing::info!(workspace_id = workspace_id, message = message, "Workflow notification");
        Ok(())
    }
}
