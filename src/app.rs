use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::auth::TokenVerifier;
use crate::config::Settings;
use crate::middleware::{request_id_layer, sanitize_request_id, X_REQUEST_ID};
use crate::routes;
use crate::services::RedisCache;
use crate::workflow::StageStateMachine;

/// BOM documents are sent inline as text
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Shared application state
pub struct AppState {
    pub settings: Settings,
    pub verifier: TokenVerifier,
    pub machine: StageStateMachine,
    /// Directory cache; `None` when Redis was unreachable at startup
    pub cache: Option<RedisCache>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        verifier: TokenVerifier,
        machine: StageStateMachine,
        cache: Option<RedisCache>,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            verifier,
            machine,
            cache,
        })
    }
}

/// Router plus the HTTP middleware stack
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.settings);
    let (set_request_id, propagate_request_id) = request_id_layer();

    // Spans at DEBUG to keep INFO output to stage events
    let trace = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    // Top to bottom is outermost to innermost
    let middleware = ServiceBuilder::new()
        .layer(cors)
        .layer(from_fn(sanitize_request_id))
        .layer(set_request_id)
        .layer(trace)
        .layer(propagate_request_id)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES));

    routes::api_router().layer(middleware).with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    let max_age = if settings.env.is_dev() { 86_400 } else { 3_600 };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([Method::GET, Method::POST, Method::OPTIONS]))
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(X_REQUEST_ID),
        ]))
        .expose_headers([HeaderName::from_static(X_REQUEST_ID)])
        .allow_credentials(true)
        .max_age(Duration::from_secs(max_age))
}
