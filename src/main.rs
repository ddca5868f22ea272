mod api;
mod app;
mod auth;
mod config;
mod db;
mod domain;
mod engine;
mod error;
mod logging;
mod middleware;
mod routes;
mod services;
mod workflow;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use config::StateStoreKind;
use engine::RegionTable;
use services::{
    ExtractionClient, Extractor, LogNotifier, Notifier, PgSupplierDirectory, RedisCache,
    StaticSupplierDirectory, SupplierDirectory, WebhookNotifier,
};
use workflow::{Collaborators, MemoryStateStore, PgStateStore, StageStateMachine, WorkflowStateStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let settings = config::Settings::from_env()?;

    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        "Starting procurement orchestrator"
    );

    let pool = db::create_pool(&settings).await?;
    db::run_migrations(&pool).await?;

    // The directory falls back to Postgres on every read without Redis
    let cache = match RedisCache::new(&settings.redis_url, settings.redis_cache_ttl_seconds).await {
        Ok(cache) => Some(cache),
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable - supplier directory will not be cached");
            None
        }
    };

    let directory: Arc<dyn SupplierDirectory> = match &settings.supplier_directory_file {
        Some(path) => {
            let directory = StaticSupplierDirectory::from_json_file(path)?;
            if directory.is_empty() {
                tracing::warn!(path = %path, "Supplier directory file is empty - no supplier will match");
            }
            tracing::info!(path = %path, suppliers = directory.len(), "Using supplier directory file");
            Arc::new(directory)
        }
        None => {
            let directory = PgSupplierDirectory::new(pool.clone(), cache.clone());
            if let Err(e) = directory.invalidate().await {
                tracing::warn!(error = %e, "Failed to clear cached supplier directory");
            }
            Arc::new(directory)
        }
    };

    let extraction_client = ExtractionClient::new(
        &settings.extraction_service_url,
        &settings.extraction_service_token,
        settings.extraction_timeout_seconds,
    )?;

    // Non-blocking health check of the extraction service
    tokio::spawn({
        let client = extraction_client.clone();
        async move {
            match client.health_check().await {
                Ok(()) => tracing::info!("Extraction service is healthy"),
                Err(e) => tracing::warn!(error = %e, "Extraction service health check failed - will retry on first request"),
            }
        }
    });

    let notifier: Arc<dyn Notifier> = match &settings.notification_webhook_url {
        Some(url) => {
            tracing::info!(url = %url, "Delivering notifications via webhook");
            Arc::new(WebhookNotifier::new(
                reqwest::Client::new(),
                url,
                Duration::from_secs(settings.notification_retry_seconds),
            ))
        }
        None => {
            tracing::info!("No notification webhook configured - notifications are logged only");
            Arc::new(LogNotifier)
        }
    };

    let store: Arc<dyn WorkflowStateStore> = match settings.state_store {
        StateStoreKind::Postgres => Arc::new(PgStateStore::new(pool)),
        StateStoreKind::Memory => {
            tracing::warn!("Using in-memory workflow state - all state is lost on restart");
            Arc::new(MemoryStateStore::new())
        }
    };

    let mut options = settings.machine_options();
    if let Some(path) = &settings.region_table_file {
        options.regions = RegionTable::from_json_file(path)?;
        tracing::info!(path = %path, states = options.regions.state_count(), "Using region table file");
    }

    let machine = StageStateMachine::new(
        Collaborators {
            store,
            extractor: Arc::new(extraction_client),
            directory,
            notifier,
        },
        options,
    );

    let verifier = auth::TokenVerifier::new(
        &settings.jwt_secret,
        &settings.jwt_audience,
        settings.jwt_issuer.as_deref(),
    );

    let state = app::AppState::new(settings.clone(), verifier, machine, cache);

    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
