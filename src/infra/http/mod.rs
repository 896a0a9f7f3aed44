mod admin;
pub mod api;
mod middleware;

pub use admin::{AdminState, build_admin_router};
pub use api::{ApiState, build_api_router};

use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::cache::JSON_CONTENT_TYPE;

/// Serve an already-serialised JSON body as is.
fn json_response(body: Bytes) -> Response {
    ([(CONTENT_TYPE, JSON_CONTENT_TYPE)], body).into_response()
}
