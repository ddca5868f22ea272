pub mod request_id;

pub use request_id::{request_id_layer, sanitize_request_id, RequestIdExt, X_REQUEST_ID};
