//! Request correlation ids
//!
//! Every request carries an `x-request-id`. A caller-supplied id is kept when
//! it is short printable ASCII; anything else is replaced with a UUID v4 so
//! the id can be forwarded to the extraction service unchanged.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Generates ids for requests that arrive without one
#[derive(Clone, Copy, Default)]
pub struct MakeCorrelationId;

impl MakeRequestId for MakeCorrelationId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// (set, propagate) pair; `set` must run outside `propagate`.
pub fn request_id_layer() -> (SetRequestIdLayer<MakeCorrelationId>, PropagateRequestIdLayer) {
    let header = HeaderName::from_static(X_REQUEST_ID);
    (
        SetRequestIdLayer::new(header.clone(), MakeCorrelationId),
        PropagateRequestIdLayer::new(header),
    )
}

/// Drops caller ids that are unsafe to forward so `SetRequestIdLayer`
/// generates a fresh one.
pub async fn sanitize_request_id(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let unusable = request
        .headers()
        .get(X_REQUEST_ID)
        .map(|value| !is_forwardable(value))
        .unwrap_or(false);

    if unusable {
        tracing::debug!("Replacing malformed x-request-id");
        request.headers_mut().remove(X_REQUEST_ID);
    }

    next.run(request).await
}

fn is_forwardable(value: &HeaderValue) -> bool {
    let bytes = value.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= MAX_REQUEST_ID_LEN
        && bytes.iter().all(|b| b.is_ascii_graphic())
}

pub trait RequestIdExt {
    fn request_id(&self) -> Option<&str>;
}

impl RequestIdExt for HeaderMap {
    fn request_id(&self) -> Option<&str> {
        self.get(X_REQUEST_ID)?.to_str().ok()
    }
}
