use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;
use url::Url;

use crate::workflow::MachineOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }
}

/// Where workflow state is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateStoreKind {
    Postgres,
    /// Process-local; state is lost on restart
    Memory,
}

impl StateStoreKind {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Self::Memory,
            _ => Self::Postgres,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,
    pub state_store: StateStoreKind,

    // Supplier directory; a JSON file replaces the suppliers table when set
    pub supplier_directory_file: Option<String>,

    // State → region rows for the location score; US census regions when unset
    pub region_table_file: Option<String>,

    // Redis (supplier directory cache)
    pub redis_url: String,
    pub redis_cache_ttl_seconds: u64,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Auth
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: Option<String>,

    // Extraction service
    pub extraction_service_url: String,
    pub extraction_service_token: String,
    pub extraction_timeout_seconds: u64,

    // Notifications
    pub notification_webhook_url: Option<String>,
    pub notification_retry_seconds: u64,

    // Workflow defaults
    pub collaborator_timeout_seconds: u64,
    pub rfq_response_days: i64,
    pub match_min_score: f64,
    pub match_max_results: usize,
    pub default_payment_terms: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Database
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10);
        let state_store = StateStoreKind::from_str(
            &env::var("STATE_STORE").unwrap_or_else(|_| "postgres".to_string()),
        );
        let supplier_directory_file = env::var("SUPPLIER_DIRECTORY_FILE")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let region_table_file = env::var("REGION_TABLE_FILE")
            .ok()
            .filter(|s| !s.trim().is_empty());

        // Redis
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://redis:6379/0".to_string());
        let redis_cache_ttl_seconds = parse_or("REDIS_CACHE_TTL_SECONDS", 900);

        // CORS
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Auth
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_audience = env::var("JWT_AUDIENCE").unwrap_or_else(|_| "procurement".to_string());
        let jwt_issuer = env::var("JWT_ISSUER").ok().filter(|s| !s.is_empty());

        // Extraction service
        let extraction_service_url = parse_service_url(
            "EXTRACTION_SERVICE_URL",
            &env::var("EXTRACTION_SERVICE_URL")
                .unwrap_or_else(|_| "http://extraction-service:8000".to_string()),
        )?;
        let extraction_service_token = env::var("EXTRACTION_SERVICE_TOKEN")
            .context("EXTRACTION_SERVICE_TOKEN must be set")?;
        let extraction_timeout_seconds = parse_or("EXTRACTION_TIMEOUT_SECONDS", 120); // LLM calls are slow

        // Notifications
        let notification_webhook_url = match env::var("NOTIFICATION_WEBHOOK_URL") {
            Ok(raw) if !raw.trim().is_empty() => {
                Some(parse_service_url("NOTIFICATION_WEBHOOK_URL", &raw)?)
            }
            _ => None,
        };
        let notification_retry_seconds = parse_or("NOTIFICATION_RETRY_SECONDS", 30);

        // Workflow defaults
        let collaborator_timeout_seconds = parse_or("COLLABORATOR_TIMEOUT_SECONDS", 30);
        let rfq_response_days = parse_or("RFQ_RESPONSE_DAYS", 14);
        let match_min_score = parse_or("MATCH_MIN_SCORE", crate::engine::matcher::DEFAULT_MIN_SCORE);
        let match_max_results =
            parse_or("MATCH_MAX_RESULTS", crate::engine::matcher::DEFAULT_MAX_RESULTS);
        let default_payment_terms =
            env::var("DEFAULT_PAYMENT_TERMS").unwrap_or_else(|_| "Net 30".to_string());

        if !(0.0..=100.0).contains(&match_min_score) {
            bail!("MATCH_MIN_SCORE must be between 0 and 100");
        }
        if match_max_results == 0 {
            bail!("MATCH_MAX_RESULTS must be at least 1");
        }
        if !(1..=crate::workflow::MAX_RFQ_RESPONSE_DAYS).contains(&rfq_response_days) {
            bail!(
                "RFQ_RESPONSE_DAYS must be between 1 and {}",
                crate::workflow::MAX_RFQ_RESPONSE_DAYS
            );
        }

        Ok(Settings {
            env,
            server_addr,
            database_url,
            database_max_connections,
            state_store,
            supplier_directory_file,
            region_table_file,
            redis_url,
            redis_cache_ttl_seconds,
            cors_allow_origins,
            jwt_secret,
            jwt_audience,
            jwt_issuer,
            extraction_service_url,
            extraction_service_token,
            extraction_timeout_seconds,
            notification_webhook_url,
            notification_retry_seconds,
            collaborator_timeout_seconds,
            rfq_response_days,
            match_min_score,
            match_max_results,
            default_payment_terms,
        })
    }

    pub fn machine_options(&self) -> MachineOptions {
        MachineOptions {
            extraction_timeout: Duration::from_secs(self.extraction_timeout_seconds),
            collaborator_timeout: Duration::from_secs(self.collaborator_timeout_seconds),
            rfq_response_days: self.rfq_response_days,
            default_min_score: self.match_min_score,
            default_max_results: self.match_max_results,
            default_payment_terms: self.default_payment_terms.clone(),
            ..Default::default()
        }
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Accept only absolute http(s) URLs, returned without a trailing slash
fn parse_service_url(name: &str, raw: &str) -> Result<String> {
    let url = Url::parse(raw.trim()).with_context(|| format!("{} is not a valid URL", name))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("{} must use http or https, got {}", name, url.scheme());
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_url_validation() {
        assert_eq!(
            parse_service_url("X", "http://extraction:8000/").unwrap(),
            "http://extraction:8000"
        );
        assert!(parse_service_url("X", "not a url").is_err());
        assert!(parse_service_url("X", "ftp://files.example.com").is_err());
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!(Environment::from_str("Production"), Environment::Prod);
        assert_eq!(Environment::from_str("staging"), Environment::Staging);
        assert!(Environment::from_str("anything").is_dev());
        assert_eq!(StateStoreKind::from_str("Memory"), StateStoreKind::Memory);
        assert_eq!(StateStoreKind::from_str(""), StateStoreKind::Postgres);
    }
}
